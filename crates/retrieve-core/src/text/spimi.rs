//! Block-based in-memory index construction (C2).
//!
//! Grounded on `spimi.py`'s `spimi_invert`/`write_block`: accumulate
//! `term -> (docId -> tf)` in memory, flush a term-sorted block file when a
//! threshold is crossed, and always flush whatever remains after the last
//! document (so a corpus smaller than the threshold still produces exactly
//! one block).

use crate::persistence::{Directory, PersistenceResult};
use crate::text::normalize::Normalizer;
use std::collections::BTreeMap;
use std::io::Write;

/// When to flush the in-memory partial index to a new block file.
///
/// Both triggers are spec-equivalent (§4.2): the final merged output must
/// not depend on which one is used, only on where the block boundaries
/// happen to fall.
#[derive(Debug, Clone, Copy)]
pub enum FlushPolicy {
    /// Flush once the estimated in-memory footprint reaches this many bytes.
    MemoryBudget(usize),
    /// Flush once this many documents have been folded into the block.
    DocCount(usize),
}

impl Default for FlushPolicy {
    fn default() -> Self {
        // 10 MiB, matching spimi.py's `max_memory_mb=10` default.
        FlushPolicy::MemoryBudget(10 * 1024 * 1024)
    }
}

/// Configuration for a SPIMI build.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpimiConfig {
    pub flush: FlushPolicy,
}

/// Per-entry overhead assumed by the memory estimator, covering the hash
/// map bucket plus the `u32` frequency counter.
const ESTIMATED_OVERHEAD_PER_POSTING: usize = 24;

/// Streams `(docId, text)` pairs and flushes term-sorted block files.
pub struct SpimiBuilder<'a> {
    directory: &'a dyn Directory,
    corpus: String,
    normalizer: &'a Normalizer,
    policy: FlushPolicy,
    partial: BTreeMap<String, BTreeMap<String, u32>>,
    estimated_bytes: usize,
    docs_in_block: usize,
    next_block_id: usize,
}

impl<'a> SpimiBuilder<'a> {
    pub fn new(
        directory: &'a dyn Directory,
        corpus: impl Into<String>,
        normalizer: &'a Normalizer,
        policy: FlushPolicy,
    ) -> Self {
        Self {
            directory,
            corpus: corpus.into(),
            normalizer,
            policy,
            partial: BTreeMap::new(),
            estimated_bytes: 0,
            docs_in_block: 0,
            next_block_id: 0,
        }
    }

    /// Fold one document into the in-memory partial index, flushing first
    /// if the configured threshold has already been crossed.
    pub fn add_document(&mut self, doc_id: &str, text: &str) -> PersistenceResult<()> {
        let tokens = self.normalizer.normalize(text);

        let mut local_freqs: BTreeMap<&str, u32> = BTreeMap::new();
        for tok in &tokens {
            *local_freqs.entry(tok.as_str()).or_insert(0) += 1;
        }

        for (term, freq) in local_freqs {
            let postings = self.partial.entry(term.to_string()).or_default();
            let was_new = !postings.contains_key(doc_id);
            *postings.entry(doc_id.to_string()).or_insert(0) += freq;
            if was_new {
                self.estimated_bytes += term.len() + doc_id.len() + ESTIMATED_OVERHEAD_PER_POSTING;
            }
        }
        self.docs_in_block += 1;

        let should_flush = match self.policy {
            FlushPolicy::MemoryBudget(budget) => self.estimated_bytes >= budget,
            FlushPolicy::DocCount(n) => self.docs_in_block >= n,
        };
        if should_flush {
            self.flush()?;
        }
        Ok(())
    }

    /// Write the current partial index as a new block file, if non-empty.
    pub fn flush(&mut self) -> PersistenceResult<()> {
        if self.partial.is_empty() {
            return Ok(());
        }
        let path = format!(
            "blocks/{}/block_{}.txt",
            self.corpus, self.next_block_id
        );
        let mut writer = self.directory.create_file(&path)?;
        for (term, postings) in &self.partial {
            let postings_str = postings
                .iter()
                .map(|(doc_id, freq)| format!("{},{}", doc_id, freq))
                .collect::<Vec<_>>()
                .join(";");
            writeln!(writer, "{}:{}", term, postings_str)?;
        }
        writer.flush()?;

        self.next_block_id += 1;
        self.partial.clear();
        self.estimated_bytes = 0;
        self.docs_in_block = 0;
        Ok(())
    }

    /// Flush any remaining state and return the total number of blocks
    /// written. Must be called after the last `add_document`.
    pub fn finish(mut self) -> PersistenceResult<usize> {
        self.flush()?;
        Ok(self.next_block_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::directory::MemoryDirectory;
    use crate::text::normalize::{Language, NormalizeConfig};

    fn normalizer() -> Normalizer {
        Normalizer::new(NormalizeConfig {
            language: Language::English,
            stopwords: Some(vec![]),
        })
    }

    #[test]
    fn single_document_flushes_one_block() {
        let dir = MemoryDirectory::new();
        let norm = normalizer();
        let mut builder = SpimiBuilder::new(&dir, "c1", &norm, FlushPolicy::default());
        builder.add_document("d1", "apple apple banana").unwrap();
        let num_blocks = builder.finish().unwrap();
        assert_eq!(num_blocks, 1);
        assert!(dir.exists("blocks/c1/block_0.txt"));
    }

    #[test]
    fn doc_count_policy_flushes_multiple_blocks() {
        let dir = MemoryDirectory::new();
        let norm = normalizer();
        let mut builder = SpimiBuilder::new(&dir, "c1", &norm, FlushPolicy::DocCount(1));
        builder.add_document("d1", "apple").unwrap();
        builder.add_document("d2", "banana").unwrap();
        let num_blocks = builder.finish().unwrap();
        assert_eq!(num_blocks, 2);
        assert!(dir.exists("blocks/c1/block_0.txt"));
        assert!(dir.exists("blocks/c1/block_1.txt"));
    }

    #[test]
    fn block_lines_are_term_sorted() {
        use std::io::Read;

        let dir = MemoryDirectory::new();
        let norm = normalizer();
        let mut builder = SpimiBuilder::new(&dir, "c1", &norm, FlushPolicy::default());
        builder.add_document("d1", "zebra apple mango").unwrap();
        builder.finish().unwrap();

        let mut contents = String::new();
        dir.open_file("blocks/c1/block_0.txt")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        let terms: Vec<&str> = contents
            .lines()
            .map(|l| l.split(':').next().unwrap())
            .collect();
        let mut sorted = terms.clone();
        sorted.sort();
        assert_eq!(terms, sorted);
    }
}
