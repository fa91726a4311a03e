//! External k-way merge of SPIMI blocks (C3).
//!
//! Grounded directly on `merge_blocks.py`: a min-heap keyed by
//! `(term, block_id)` drives the merge, `df`/`idf = ln(N/df)`/
//! `w = (1 + ln tf) * idf` are computed per term, and the dictionary is
//! written as `term|offset|df` lines alongside a self-delimited JSONL
//! postings file and a `docId -> norm` map.

use crate::error::{RetrieveError, RetrieveResult};
use crate::persistence::{Directory, ReadSeek};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::io::{BufRead, BufReader, Write};

#[derive(Serialize)]
struct PostingsRecord<'a> {
    term: &'a str,
    postings: Vec<(&'a str, f32)>,
}

/// Summary returned after a successful merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeSummary {
    pub num_terms: usize,
    pub num_docs: usize,
    pub num_blocks: usize,
}

struct BlockCursor {
    lines: std::io::Lines<BufReader<Box<dyn ReadSeek>>>,
    /// (term, postings_str) of the current unread line, if any.
    current: Option<(String, String)>,
}

impl BlockCursor {
    fn open(directory: &dyn Directory, path: &str) -> RetrieveResult<Self> {
        let reader = BufReader::new(directory.open_file(path)?);
        let mut cursor = BlockCursor {
            lines: reader.lines(),
            current: None,
        };
        cursor.advance();
        Ok(cursor)
    }

    /// Load the next well-formed `term:postings` line into `current`,
    /// skipping malformed lines with a diagnostic.
    fn advance(&mut self) {
        loop {
            match self.lines.next() {
                None => {
                    self.current = None;
                    return;
                }
                Some(Err(e)) => {
                    eprintln!("[merge] skipping unreadable block line: {}", e);
                    continue;
                }
                Some(Ok(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match line.split_once(':') {
                        Some((term, postings)) if !term.is_empty() => {
                            self.current = Some((term.to_string(), postings.to_string()));
                            return;
                        }
                        _ => {
                            eprintln!("[merge] skipping malformed block line: {:?}", line);
                            continue;
                        }
                    }
                }
            }
        }
    }
}

fn parse_postings_into(postings_str: &str, into: &mut BTreeMap<String, u32>) {
    for entry in postings_str.split(';') {
        if entry.is_empty() {
            continue;
        }
        match entry.split_once(',') {
            Some((doc_id, freq_str)) => match freq_str.parse::<u32>() {
                Ok(freq) => {
                    *into.entry(doc_id.to_string()).or_insert(0) += freq;
                }
                Err(_) => eprintln!("[merge] skipping malformed posting: {:?}", entry),
            },
            None => eprintln!("[merge] skipping malformed posting: {:?}", entry),
        }
    }
}

/// Merge every block under `blocks/<corpus>/` into `dictionary.txt`,
/// `postings.jsonl`, and `norms.json` under `<corpus>/`.
///
/// `num_docs` is the total document count `N` used for IDF.
pub fn merge_blocks(
    directory: &dyn Directory,
    corpus: &str,
    num_docs: usize,
) -> RetrieveResult<MergeSummary> {
    let block_dir = format!("blocks/{}", corpus);
    let mut block_files = directory
        .list_dir(&block_dir)
        .map_err(|_| RetrieveError::InputError(format!("no blocks found for corpus '{}'", corpus)))?
        .into_iter()
        .filter(|f| f.ends_with(".txt"))
        .collect::<Vec<_>>();
    block_files.sort();

    if block_files.is_empty() {
        return Err(RetrieveError::InputError(format!(
            "corpus '{}' has no block files to merge",
            corpus
        )));
    }

    let mut cursors: Vec<BlockCursor> = block_files
        .iter()
        .map(|f| BlockCursor::open(directory, &format!("{}/{}", block_dir, f)))
        .collect::<RetrieveResult<_>>()?;

    let mut heap: BinaryHeap<Reverse<(String, usize)>> = BinaryHeap::new();
    for (idx, cursor) in cursors.iter().enumerate() {
        if let Some((term, _)) = &cursor.current {
            heap.push(Reverse((term.clone(), idx)));
        }
    }

    let postings_path = format!("{}/postings.jsonl", corpus);
    let mut postings_out = CountingWriter::new(directory.create_file(&postings_path)?);

    let mut dictionary_entries: Vec<(String, u64, usize)> = Vec::new();
    let mut norms: BTreeMap<String, f64> = BTreeMap::new();

    while let Some(Reverse((term, first_block))) = heap.pop() {
        let mut accumulator: BTreeMap<String, u32> = BTreeMap::new();
        if let Some((_, postings_str)) = cursors[first_block].current.take() {
            parse_postings_into(&postings_str, &mut accumulator);
        }
        cursors[first_block].advance();
        if let Some((next_term, _)) = &cursors[first_block].current {
            heap.push(Reverse((next_term.clone(), first_block)));
        }

        while let Some(Reverse((top_term, _))) = heap.peek() {
            if *top_term != term {
                break;
            }
            let Reverse((_, block_idx)) = heap.pop().unwrap();
            if let Some((_, postings_str)) = cursors[block_idx].current.take() {
                parse_postings_into(&postings_str, &mut accumulator);
            }
            cursors[block_idx].advance();
            if let Some((next_term, _)) = &cursors[block_idx].current {
                heap.push(Reverse((next_term.clone(), block_idx)));
            }
        }

        let df = accumulator.len();
        if df == 0 {
            continue;
        }
        let idf = (num_docs as f64 / df as f64).ln();

        let mut weighted: Vec<(&str, f32)> = Vec::with_capacity(df);
        for (doc_id, tf) in &accumulator {
            let tf_weight = 1.0 + (*tf as f64).ln();
            let w = tf_weight * idf;
            *norms.entry(doc_id.clone()).or_insert(0.0) += w * w;
            weighted.push((doc_id.as_str(), w as f32));
        }

        let offset = postings_out.bytes_written();
        let record = PostingsRecord {
            term: &term,
            postings: weighted,
        };
        serde_json::to_writer(&mut postings_out, &record)
            .map_err(|e| RetrieveError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        postings_out.write_all(b"\n")?;

        dictionary_entries.push((term, offset, df));
    }
    postings_out.flush()?;

    dictionary_entries.sort_by(|a, b| a.0.cmp(&b.0));
    let mut dict_out = directory.create_file(&format!("{}/dictionary.txt", corpus))?;
    for (term, offset, df) in &dictionary_entries {
        writeln!(dict_out, "{}|{}|{}", term, offset, df)?;
    }
    dict_out.flush()?;

    let norms: BTreeMap<String, f64> = norms.into_iter().map(|(k, v)| (k, v.sqrt())).collect();
    let norms_out = directory.create_file(&format!("{}/norms.json", corpus))?;
    serde_json::to_writer_pretty(norms_out, &norms)
        .map_err(|e| RetrieveError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

    Ok(MergeSummary {
        num_terms: dictionary_entries.len(),
        num_docs: norms.len(),
        num_blocks: block_files.len(),
    })
}

/// Tracks bytes written so postings offsets can be recorded without a
/// separate `seek`/`tell` round trip.
struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }

    fn bytes_written(&self) -> u64 {
        self.count
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::directory::MemoryDirectory;
    use std::io::Write as _;

    fn write_block(dir: &MemoryDirectory, corpus: &str, idx: usize, lines: &[&str]) {
        let path = format!("blocks/{}/block_{}.txt", corpus, idx);
        let mut f = dir.create_file(&path).unwrap();
        for line in lines {
            writeln!(f, "{}", line).unwrap();
        }
        f.flush().unwrap();
    }

    #[test]
    fn two_block_scenario_matches_spec() {
        let dir = MemoryDirectory::new();
        write_block(&dir, "c1", 0, &["apple:d1,2", "banana:d1,1"]);
        write_block(&dir, "c1", 1, &["apple:d2,3", "cherry:d2,1"]);

        let summary = merge_blocks(&dir, "c1", 2).unwrap();
        assert_eq!(summary.num_terms, 3);
        assert_eq!(summary.num_docs, 2);

        let mut dict_contents = String::new();
        dir.open_file("c1/dictionary.txt")
            .unwrap()
            .read_to_string(&mut dict_contents)
            .unwrap();
        let terms: Vec<&str> = dict_contents
            .lines()
            .map(|l| l.split('|').next().unwrap())
            .collect();
        assert_eq!(terms, vec!["apple", "banana", "cherry"]);

        for line in dict_contents.lines() {
            let parts: Vec<&str> = line.split('|').collect();
            let term = parts[0];
            let df: usize = parts[2].parse().unwrap();
            match term {
                "apple" => assert_eq!(df, 2),
                "banana" => assert_eq!(df, 1),
                "cherry" => assert_eq!(df, 1),
                _ => panic!("unexpected term {}", term),
            }
        }
    }

    #[test]
    fn single_document_corpus_has_zero_idf() {
        let dir = MemoryDirectory::new();
        write_block(&dir, "c1", 0, &["fox:d1,1", "quick:d1,1"]);

        merge_blocks(&dir, "c1", 1).unwrap();

        let mut postings = String::new();
        dir.open_file("c1/postings.jsonl")
            .unwrap()
            .read_to_string(&mut postings)
            .unwrap();
        for line in postings.lines() {
            let v: serde_json::Value = serde_json::from_str(line).unwrap();
            let weight = v["postings"][0][1].as_f64().unwrap();
            assert!((weight - 0.0).abs() < 1e-9);
        }
    }

    #[test]
    fn empty_block_directory_is_a_build_error() {
        let dir = MemoryDirectory::new();
        let err = merge_blocks(&dir, "missing", 5).unwrap_err();
        assert!(matches!(err, RetrieveError::InputError(_)));
    }

    #[test]
    fn dictionary_offsets_and_df_are_consistent() {
        let dir = MemoryDirectory::new();
        write_block(&dir, "c1", 0, &["apple:d1,2;d2,1", "banana:d1,1"]);
        merge_blocks(&dir, "c1", 2).unwrap();

        let mut dict = String::new();
        dir.open_file("c1/dictionary.txt")
            .unwrap()
            .read_to_string(&mut dict)
            .unwrap();
        let mut postings = String::new();
        dir.open_file("c1/postings.jsonl")
            .unwrap()
            .read_to_string(&mut postings)
            .unwrap();

        for line in dict.lines() {
            let parts: Vec<&str> = line.split('|').collect();
            let offset: usize = parts[1].parse().unwrap();
            let df: usize = parts[2].parse().unwrap();
            let record_line = &postings[offset..];
            let record_line = record_line.lines().next().unwrap();
            let v: serde_json::Value = serde_json::from_str(record_line).unwrap();
            assert_eq!(v["postings"].as_array().unwrap().len(), df);
        }
    }
}
