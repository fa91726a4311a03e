//! Cosine-similarity text retrieval (C4).
//!
//! Grounded on `search_engine.py`: normalize the query with the same
//! pipeline used at index time, probe the dictionary for each distinct
//! query term, read only the postings records the query touches (in
//! offset order, to stay scan-friendly), accumulate dot products, and
//! normalize by the precomputed document norms.

use crate::error::{RetrieveError, RetrieveResult};
use crate::persistence::Directory;
use crate::text::documents::DocumentStore;
use crate::text::normalize::Normalizer;
use crate::topk::{ScoredId, TopK};
use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};

/// Half-width (in words) of the snippet window around the first matching
/// term, per §4.4's snippet rule.
const SNIPPET_HALF_WIDTH: usize = 40;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub doc_id: String,
    pub score: f32,
    pub extra: serde_json::Map<String, serde_json::Value>,
    pub snippet: String,
}

struct DictionaryEntry {
    offset: u64,
    df: usize,
}

/// Owns a corpus's loaded dictionary and norms map; the postings file is
/// reopened and seeked per query since seeks are stateful.
///
/// Caching is scoped to this value's lifetime rather than a process-wide
/// singleton: holding one per corpus, and dropping it on corpus change, is
/// how the cache gets invalidated.
pub struct TextRetriever<'a> {
    directory: &'a dyn Directory,
    corpus: String,
    normalizer: &'a Normalizer,
    dictionary: BTreeMap<String, DictionaryEntry>,
    norms: HashMap<String, f64>,
}

impl<'a> TextRetriever<'a> {
    pub fn open(
        directory: &'a dyn Directory,
        corpus: &str,
        normalizer: &'a Normalizer,
    ) -> RetrieveResult<Self> {
        let dictionary = load_dictionary(directory, corpus)?;
        let norms = load_norms(directory, corpus)?;
        Ok(Self {
            directory,
            corpus: corpus.to_string(),
            normalizer,
            dictionary,
            norms,
        })
    }

    /// Total number of indexed documents, as tracked by the norms file.
    pub fn num_docs(&self) -> usize {
        self.norms.len()
    }

    pub fn search(&self, query: &str, k: usize) -> RetrieveResult<Vec<SearchHit>> {
        let query_terms = self.normalizer.normalize(query);
        if query_terms.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut query_tf: BTreeMap<String, u32> = BTreeMap::new();
        for term in &query_terms {
            *query_tf.entry(term.clone()).or_insert(0) += 1;
        }

        let n = self.num_docs() as f64;
        let mut query_weights: Vec<(String, u64, f64)> = Vec::new();
        for (term, count) in &query_tf {
            let Some(entry) = self.dictionary.get(term) else {
                continue;
            };
            if entry.df == 0 {
                continue;
            }
            let tf_q = 1.0 + (*count as f64).ln();
            let idf = (n / entry.df as f64).ln();
            query_weights.push((term.clone(), entry.offset, tf_q * idf));
        }
        if query_weights.is_empty() {
            return Ok(Vec::new());
        }

        let query_norm = query_weights
            .iter()
            .map(|(_, _, w)| w * w)
            .sum::<f64>()
            .sqrt();
        if query_norm > 0.0 {
            for (_, _, w) in &mut query_weights {
                *w /= query_norm;
            }
        }

        // Sequential read optimization: visit touched postings in offset order.
        query_weights.sort_by_key(|(_, offset, _)| *offset);

        let mut postings_reader = self.directory.open_file(&format!("{}/postings.jsonl", self.corpus))?;
        let mut scores: HashMap<String, f64> = HashMap::new();
        for (term, offset, w_q) in &query_weights {
            let record = read_postings_record(&mut postings_reader, *offset)
                .map_err(|e| RetrieveError::CorruptIndex(format!("term '{}': {}", term, e)))?;
            for (doc_id, w_d) in record {
                *scores.entry(doc_id).or_insert(0.0) += w_q * w_d as f64;
            }
        }

        let mut topk = TopK::new(k);
        for (doc_id, raw_score) in scores {
            let norm = self.norms.get(&doc_id).copied().unwrap_or(0.0);
            if norm <= 0.0 {
                continue;
            }
            let cosine = (raw_score / norm).clamp(0.0, 1.0);
            topk.push(ScoredId {
                score: cosine as f32,
                id: doc_id,
            });
        }

        let winners = topk.into_sorted_vec();
        let documents = DocumentStore::open(self.directory, &self.corpus)?;
        let query_term_set: std::collections::HashSet<&str> =
            query_terms.iter().map(String::as_str).collect();

        let mut hits = Vec::with_capacity(winners.len());
        for ScoredId { score, id } in winners {
            let record = documents.get(&id)?;
            let (extra, text) = match record {
                Some(r) => (r.extra, r.text),
                None => (serde_json::Map::new(), String::new()),
            };
            let snippet = build_snippet(&text, &query_term_set);
            hits.push(SearchHit {
                doc_id: id,
                score,
                extra,
                snippet,
            });
        }
        Ok(hits)
    }
}

fn load_dictionary(
    directory: &dyn Directory,
    corpus: &str,
) -> RetrieveResult<BTreeMap<String, DictionaryEntry>> {
    let reader = directory
        .open_file(&format!("{}/dictionary.txt", corpus))
        .map_err(|_| RetrieveError::MissingArtifact {
            corpus: corpus.to_string(),
            artifact: "dictionary.txt".to_string(),
        })?;
    let mut dictionary = BTreeMap::new();
    for line in BufReader::new(reader).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split('|').collect();
        if parts.len() != 3 {
            return Err(RetrieveError::CorruptIndex(format!(
                "malformed dictionary line: {:?}",
                line
            )));
        }
        let offset: u64 = parts[1]
            .parse()
            .map_err(|_| RetrieveError::CorruptIndex(format!("bad offset in line: {:?}", line)))?;
        let df: usize = parts[2]
            .parse()
            .map_err(|_| RetrieveError::CorruptIndex(format!("bad df in line: {:?}", line)))?;
        dictionary.insert(parts[0].to_string(), DictionaryEntry { offset, df });
    }
    Ok(dictionary)
}

fn load_norms(directory: &dyn Directory, corpus: &str) -> RetrieveResult<HashMap<String, f64>> {
    let reader = directory
        .open_file(&format!("{}/norms.json", corpus))
        .map_err(|_| RetrieveError::MissingArtifact {
            corpus: corpus.to_string(),
            artifact: "norms.json".to_string(),
        })?;
    serde_json::from_reader(reader)
        .map_err(|e| RetrieveError::CorruptIndex(format!("malformed norms.json: {}", e)))
}

/// Seek to `offset` and parse the one JSONL postings record starting there.
fn read_postings_record<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
) -> Result<Vec<(String, f32)>, String> {
    reader.seek(SeekFrom::Start(offset)).map_err(|e| e.to_string())?;
    let mut line = String::new();
    BufReader::new(reader)
        .read_line(&mut line)
        .map_err(|e| e.to_string())?;
    let value: serde_json::Value = serde_json::from_str(line.trim_end()).map_err(|e| e.to_string())?;
    let postings = value
        .get("postings")
        .and_then(|v| v.as_array())
        .ok_or_else(|| "missing postings array".to_string())?;
    let mut out = Vec::with_capacity(postings.len());
    for entry in postings {
        let pair = entry.as_array().ok_or_else(|| "malformed posting entry".to_string())?;
        let doc_id = pair
            .first()
            .and_then(|v| v.as_str())
            .ok_or_else(|| "missing docId in posting".to_string())?
            .to_string();
        let weight = pair
            .get(1)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| "missing weight in posting".to_string())? as f32;
        out.push((doc_id, weight));
    }
    Ok(out)
}

fn build_snippet(text: &str, query_terms: &std::collections::HashSet<&str>) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return String::new();
    }
    let hit_index = words.iter().position(|word| {
        let lower = word.to_lowercase();
        query_terms.iter().any(|term| lower.contains(term))
    });
    let (start, end) = match hit_index {
        Some(i) => (
            i.saturating_sub(SNIPPET_HALF_WIDTH),
            (i + SNIPPET_HALF_WIDTH).min(words.len()),
        ),
        None => (0, SNIPPET_HALF_WIDTH.min(words.len())),
    };
    words[start..end].join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::directory::MemoryDirectory;
    use crate::text::documents::{write_documents, DocumentRecord};
    use crate::text::normalize::{Language, NormalizeConfig};
    use crate::text::spimi::{FlushPolicy, SpimiBuilder};

    fn normalizer() -> Normalizer {
        Normalizer::new(NormalizeConfig {
            language: Language::English,
            stopwords: Some(
                ["the", "a", "an", "is", "of"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            ),
        })
    }

    fn build_corpus(dir: &MemoryDirectory, norm: &Normalizer, docs: &[(&str, &str)]) {
        let mut builder = SpimiBuilder::new(dir, "c1", norm, FlushPolicy::default());
        for (id, text) in docs {
            builder.add_document(id, text).unwrap();
        }
        builder.finish().unwrap();
        crate::text::merge::merge_blocks(dir, "c1", docs.len()).unwrap();

        let records: Vec<DocumentRecord> = docs
            .iter()
            .map(|(id, text)| DocumentRecord {
                doc_id: id.to_string(),
                text: text.to_string(),
                extra: serde_json::Map::new(),
            })
            .collect();
        write_documents(dir, "c1", records.iter()).unwrap();
    }

    #[test]
    fn three_document_scenario_orders_by_relevance() {
        let dir = MemoryDirectory::new();
        let norm = normalizer();
        build_corpus(
            &dir,
            &norm,
            &[
                ("d1", "the quick brown fox"),
                ("d2", "quick brown dogs"),
                ("d3", "lazy fox"),
            ],
        );

        let retriever = TextRetriever::open(&dir, "c1", &norm).unwrap();
        let hits = retriever.search("quick fox", 10).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.doc_id.as_str()).collect();
        assert_eq!(ids[0], "d1");
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn unknown_term_returns_empty() {
        let dir = MemoryDirectory::new();
        let norm = normalizer();
        build_corpus(
            &dir,
            &norm,
            &[
                ("d1", "the quick brown fox"),
                ("d2", "quick brown dogs"),
                ("d3", "lazy fox"),
            ],
        );
        let retriever = TextRetriever::open(&dir, "c1", &norm).unwrap();
        assert!(retriever.search("xyz", 10).unwrap().is_empty());
    }

    #[test]
    fn empty_query_returns_empty() {
        let dir = MemoryDirectory::new();
        let norm = normalizer();
        build_corpus(&dir, &norm, &[("d1", "fox")]);
        let retriever = TextRetriever::open(&dir, "c1", &norm).unwrap();
        assert!(retriever.search("   ", 10).unwrap().is_empty());
    }

    #[test]
    fn k_zero_returns_empty() {
        let dir = MemoryDirectory::new();
        let norm = normalizer();
        build_corpus(&dir, &norm, &[("d1", "fox")]);
        let retriever = TextRetriever::open(&dir, "c1", &norm).unwrap();
        assert!(retriever.search("fox", 0).unwrap().is_empty());
    }

    #[test]
    fn query_equal_to_document_scores_near_one() {
        let dir = MemoryDirectory::new();
        let norm = normalizer();
        build_corpus(
            &dir,
            &norm,
            &[("d1", "zebra mango kite"), ("d2", "ocean river stone")],
        );
        let retriever = TextRetriever::open(&dir, "c1", &norm).unwrap();
        let hits = retriever.search("zebra mango kite", 1).unwrap();
        assert_eq!(hits[0].doc_id, "d1");
        assert!(hits[0].score > 0.99);
    }

    #[test]
    fn k_larger_than_corpus_returns_all_nonzero() {
        let dir = MemoryDirectory::new();
        let norm = normalizer();
        build_corpus(&dir, &norm, &[("d1", "alpha beta"), ("d2", "alpha gamma")]);
        let retriever = TextRetriever::open(&dir, "c1", &norm).unwrap();
        let hits = retriever.search("alpha", 100).unwrap();
        assert!(hits.len() <= 2);
    }
}
