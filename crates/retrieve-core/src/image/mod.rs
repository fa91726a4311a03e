//! Image similarity engine: visual vocabulary training (C6), histogram /
//! inverted-index construction (C7), and BoVW cosine retrieval (C8).

pub mod indexer;
pub mod retriever;
pub mod vocabulary;

pub use indexer::{build_image_index, ImageBuildSummary};
pub use retriever::{ImageRetriever, ImageSearchHit, SearchMode};
pub use vocabulary::{Codebook, VocabularyConfig, VocabularyTrainer};
