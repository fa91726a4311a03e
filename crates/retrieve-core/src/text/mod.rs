//! Textual search engine: normalize (C1) -> SPIMI blocks (C2) -> external
//! merge (C3) -> cosine retrieval (C4) over a document store (C5).

pub mod documents;
pub mod merge;
pub mod normalize;
pub mod retriever;
pub mod spimi;

pub use documents::{DocumentRecord, DocumentStore};
pub use merge::MergeSummary;
pub use normalize::{Language, NormalizeConfig, Normalizer};
pub use retriever::{SearchHit, TextRetriever};
pub use spimi::{FlushPolicy, SpimiBuilder, SpimiConfig};

use crate::error::{RetrieveError, RetrieveResult};
use crate::persistence::Directory;

/// Build pipeline state for one corpus. Used only to assert against
/// operations happening out of order; not part of the public surface.
///
/// A partial `Blocking`/`Flushing` state left on disk after a crash is not
/// recoverable — the caller must delete the corpus's `blocks/` directory
/// before retrying, since the merger never inspects a half-written block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildState {
    Empty,
    Blocking,
    Flushing,
    Merging,
    Indexed,
}

/// Outcome of a successful text build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildSummary {
    pub num_terms: usize,
    pub num_docs: usize,
    pub num_blocks: usize,
}

/// Build a corpus end to end from a CSV file: SPIMI blocks, then merge,
/// then the document store, writing everything under `corpus` in
/// `directory`.
///
/// `doc_id_column` and `text_column` are zero-based column indices.
/// Malformed rows (missing columns, non-UTF-8) are skipped with a
/// diagnostic rather than aborting the build.
pub fn build_from_csv(
    directory: &dyn Directory,
    corpus: &str,
    csv_bytes: &[u8],
    doc_id_column: usize,
    text_column: usize,
    normalize_config: NormalizeConfig,
    spimi_config: SpimiConfig,
) -> RetrieveResult<BuildSummary> {
    let normalizer = Normalizer::new(normalize_config);
    let mut builder = SpimiBuilder::new(directory, corpus, &normalizer, spimi_config.flush);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(csv_bytes);

    let mut records: Vec<DocumentRecord> = Vec::new();
    let mut state = BuildState::Blocking;
    for (row_num, row) in reader.records().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                eprintln!("[build_from_csv] skipping row {}: {}", row_num, e);
                continue;
            }
        };
        let doc_id = match row.get(doc_id_column) {
            Some(v) => v.to_string(),
            None => {
                eprintln!(
                    "[build_from_csv] skipping row {}: missing doc-id column {}",
                    row_num, doc_id_column
                );
                continue;
            }
        };
        let text = match row.get(text_column) {
            Some(v) => v.to_string(),
            None => {
                eprintln!(
                    "[build_from_csv] skipping row {}: missing text column {}",
                    row_num, text_column
                );
                continue;
            }
        };

        builder
            .add_document(&doc_id, &text)
            .map_err(RetrieveError::from)?;
        records.push(DocumentRecord {
            doc_id,
            text,
            extra: serde_json::Map::new(),
        });
    }

    state = BuildState::Flushing;
    let num_blocks = builder.finish().map_err(RetrieveError::from)?;
    let _ = state;

    if records.is_empty() {
        return Err(RetrieveError::InputError(
            "no usable rows found in corpus file".to_string(),
        ));
    }

    state = BuildState::Merging;
    let merge_summary = merge::merge_blocks(directory, corpus, records.len())?;
    let _ = state;

    documents::write_documents(directory, corpus, records.iter())?;
    state = BuildState::Indexed;
    debug_assert_eq!(state, BuildState::Indexed);

    Ok(BuildSummary {
        num_terms: merge_summary.num_terms,
        num_docs: merge_summary.num_docs,
        num_blocks,
    })
}
