//! BoVW cosine-similarity image retrieval (C8).
//!
//! Grounded on `vector_engine.py`'s `_search_sequential`/`_search_inverted`:
//! sequential mode scores every stored histogram with SIMD cosine
//! similarity; inverted mode only walks the posting lists of visual words
//! present in the query and discards scores under the epsilon cutoff.

use crate::error::{RetrieveError, RetrieveResult};
use crate::image::vocabulary::Codebook;
use crate::persistence::Directory;
use crate::simd;
use crate::topk::{ScoredId, TopK};
use std::collections::{BTreeMap, HashMap};

/// Scores at or below this are discarded in inverted mode, matching
/// `vector_engine.py`'s `if final_score > 0.001`.
const INVERTED_MODE_EPSILON: f32 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Sequential,
    Inverted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageSearchHit {
    pub image_id: String,
    pub score: f32,
    pub metadata: Option<serde_json::Value>,
}

/// Owns a corpus's loaded image artifacts for the lifetime of the value.
pub struct ImageRetriever {
    codebook: Codebook,
    histograms: HashMap<String, Vec<f32>>,
    inverted: BTreeMap<usize, Vec<(String, f32)>>,
    idf: Vec<f32>,
    norms: HashMap<String, f32>,
}

impl ImageRetriever {
    pub fn open(directory: &dyn Directory, corpus: &str, codebook: Codebook) -> RetrieveResult<Self> {
        let histograms = read_json(directory, corpus, "histograms.json")?;
        let inverted = read_json(directory, corpus, "inverted_index.json")?;
        let idf = read_json(directory, corpus, "idf_weights.json")?;
        let norms = read_json(directory, corpus, "norms.json")?;
        Ok(Self {
            codebook,
            histograms,
            inverted,
            idf,
            norms,
        })
    }

    /// Build the TF-IDF query vector for a set of local descriptors.
    fn query_vector(&self, descriptors: &[Vec<f32>]) -> Vec<f32> {
        let k = self.codebook.k;
        let mut counts = vec![0u32; k];
        for descriptor in descriptors {
            counts[self.codebook.assign(descriptor)] += 1;
        }
        let total: u32 = counts.iter().sum();
        let mut vec = vec![0.0f32; k];
        if total == 0 {
            return vec;
        }
        for (word, &count) in counts.iter().enumerate() {
            if count > 0 {
                vec[word] = (count as f32 / total as f32) * self.idf[word];
            }
        }
        vec
    }

    pub fn search(
        &self,
        descriptors: &[Vec<f32>],
        k: usize,
        mode: SearchMode,
        metadata: Option<&HashMap<String, serde_json::Value>>,
    ) -> RetrieveResult<Vec<ImageSearchHit>> {
        if k == 0 || descriptors.is_empty() {
            return Ok(Vec::new());
        }
        let query = self.query_vector(descriptors);
        let query_norm = simd::norm(&query);
        if query_norm == 0.0 {
            return Ok(Vec::new());
        }

        let winners = match mode {
            SearchMode::Sequential => self.search_sequential(&query, query_norm, k),
            SearchMode::Inverted => self.search_inverted(&query, query_norm, k),
        };

        Ok(winners
            .into_iter()
            .map(|ScoredId { score, id }| {
                let lookup_id = id.trim_end_matches(".jpg").trim_end_matches(".png");
                let metadata = metadata.and_then(|m| m.get(lookup_id)).cloned();
                ImageSearchHit {
                    image_id: id,
                    score,
                    metadata,
                }
            })
            .collect())
    }

    fn search_sequential(&self, query: &[f32], query_norm: f32, k: usize) -> Vec<ScoredId> {
        let mut topk = TopK::new(k);
        for (image_id, hist) in &self.histograms {
            let doc_norm = self.norms.get(image_id).copied().unwrap_or(0.0);
            if doc_norm == 0.0 {
                continue;
            }
            let doc_vec: Vec<f32> = hist
                .iter()
                .zip(&self.idf)
                .map(|(&tf, &idf)| tf * idf)
                .collect();
            let cosine = (simd::dot(query, &doc_vec) / (query_norm * doc_norm)).clamp(0.0, 1.0);
            topk.push(ScoredId {
                score: cosine,
                id: image_id.clone(),
            });
        }
        topk.into_sorted_vec()
    }

    fn search_inverted(&self, query: &[f32], query_norm: f32, k: usize) -> Vec<ScoredId> {
        let mut scores: HashMap<String, f32> = HashMap::new();
        for (word, &q_weight) in query.iter().enumerate() {
            if q_weight <= 0.0 {
                continue;
            }
            let Some(postings) = self.inverted.get(&word) else {
                continue;
            };
            for (image_id, doc_weight) in postings {
                *scores.entry(image_id.clone()).or_insert(0.0) += q_weight * doc_weight;
            }
        }

        let mut topk = TopK::new(k);
        for (image_id, raw_score) in scores {
            let doc_norm = self.norms.get(&image_id).copied().unwrap_or(0.0);
            if query_norm * doc_norm <= 0.0 {
                continue;
            }
            let cosine = (raw_score / (query_norm * doc_norm)).clamp(0.0, 1.0);
            if cosine <= INVERTED_MODE_EPSILON {
                continue;
            }
            topk.push(ScoredId {
                score: cosine,
                id: image_id,
            });
        }
        topk.into_sorted_vec()
    }
}

fn read_json<T: serde::de::DeserializeOwned>(
    directory: &dyn Directory,
    corpus: &str,
    artifact: &str,
) -> RetrieveResult<T> {
    let reader = directory
        .open_file(&format!("{}/{}", corpus, artifact))
        .map_err(|_| RetrieveError::MissingArtifact {
            corpus: corpus.to_string(),
            artifact: artifact.to_string(),
        })?;
    serde_json::from_reader(reader)
        .map_err(|e| RetrieveError::CorruptIndex(format!("malformed {}: {}", artifact, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::indexer::build_image_index;
    use crate::image::vocabulary::VocabularyConfig;
    use crate::persistence::directory::MemoryDirectory;

    fn tiny_codebook() -> Codebook {
        serde_json::from_value(serde_json::json!({
            "k": 2,
            "dimension": 2,
            "centroids": [0.0, 0.0, 10.0, 10.0]
        }))
        .unwrap()
    }

    fn build(dir: &MemoryDirectory) -> Codebook {
        let codebook = tiny_codebook();
        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let descriptors_for = |id: &str| -> RetrieveResult<Option<Vec<Vec<f32>>>> {
            Ok(Some(match id {
                "a" => vec![vec![0.1, 0.1], vec![0.0, 0.2]],
                "b" => vec![vec![9.9, 9.9]],
                _ => vec![vec![0.2, 0.1]],
            }))
        };
        build_image_index(dir, "img1", &codebook, &ids, descriptors_for).unwrap();
        codebook
    }

    #[test]
    fn sequential_and_inverted_agree_on_identical_query() {
        let dir = MemoryDirectory::new();
        let codebook = build(&dir);
        let retriever = ImageRetriever::open(&dir, "img1", codebook).unwrap();

        let query = vec![vec![0.1, 0.1], vec![0.0, 0.2]];
        let seq = retriever
            .search(&query, 3, SearchMode::Sequential, None)
            .unwrap();
        let inv = retriever
            .search(&query, 3, SearchMode::Inverted, None)
            .unwrap();

        assert_eq!(seq[0].image_id, "a");
        assert!(seq[0].score > 0.99);
        assert_eq!(inv[0].image_id, "a");
        assert!(inv[0].score > 0.99);
    }

    #[test]
    fn k_zero_returns_empty() {
        let dir = MemoryDirectory::new();
        let codebook = build(&dir);
        let retriever = ImageRetriever::open(&dir, "img1", codebook).unwrap();
        let hits = retriever
            .search(&[vec![0.1, 0.1]], 0, SearchMode::Sequential, None)
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn empty_descriptors_return_empty() {
        let dir = MemoryDirectory::new();
        let codebook = build(&dir);
        let retriever = ImageRetriever::open(&dir, "img1", codebook).unwrap();
        let hits = retriever
            .search(&[], 5, SearchMode::Sequential, None)
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn metadata_is_looked_up_without_extension() {
        let dir = MemoryDirectory::new();
        let codebook = tiny_codebook();
        let ids = vec!["a.jpg".to_string()];
        build_image_index(&dir, "img2", &codebook, &ids, |_| {
            Ok(Some(vec![vec![0.1, 0.1]]))
        })
        .unwrap();
        let retriever = ImageRetriever::open(&dir, "img2", codebook).unwrap();

        let mut metadata = HashMap::new();
        metadata.insert("a".to_string(), serde_json::json!({"title": "Example"}));

        let hits = retriever
            .search(&[vec![0.1, 0.1]], 1, SearchMode::Sequential, Some(&metadata))
            .unwrap();
        assert_eq!(hits[0].metadata.as_ref().unwrap()["title"], "Example");
    }
}
