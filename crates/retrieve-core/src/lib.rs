//! Multimodal retrieval: a textual search engine and an image similarity
//! engine sharing one persistence layer and one top-k primitive.
//!
//! # Text engine
//!
//! SPIMI block construction ([`text::spimi`]) followed by an external
//! k-way merge ([`text::merge`]) builds a disk-resident TF-IDF index;
//! [`text::TextRetriever`] answers free-text queries by cosine similarity
//! against only the posting lists a query touches.
//!
//! # Image engine
//!
//! [`image::VocabularyTrainer`] clusters local descriptors into a visual
//! codebook; [`image::build_image_index`] turns per-image descriptor
//! matrices into TF-IDF histograms and an inverted index over visual
//! words; [`image::ImageRetriever`] answers image-by-example queries in
//! either brute-force or inverted-index mode.
//!
//! Both engines persist to line-oriented text / JSON artifacts via the
//! [`persistence::Directory`] abstraction, so a [`persistence::MemoryDirectory`]
//! can stand in for the filesystem in tests.
//!
//! # Quick start
//!
//! ```rust
//! use retrieve_core::persistence::directory::MemoryDirectory;
//! use retrieve_core::text::{build_from_csv, NormalizeConfig, SpimiConfig, Normalizer, TextRetriever};
//!
//! let dir = MemoryDirectory::new();
//! let csv = "id,body\nd1,the quick brown fox\nd2,lazy dogs\n";
//! build_from_csv(&dir, "demo", csv.as_bytes(), 0, 1, NormalizeConfig::default(), SpimiConfig::default())?;
//!
//! let normalizer = Normalizer::new(NormalizeConfig::default());
//! let retriever = TextRetriever::open(&dir, "demo", &normalizer)?;
//! let hits = retriever.search("fox", 5)?;
//! # Ok::<(), retrieve_core::RetrieveError>(())
//! ```

pub mod error;
pub mod image;
pub mod persistence;
pub mod simd;
pub mod text;
pub mod topk;

pub use error::{RetrieveError, RetrieveResult};

/// Re-exports of the most commonly used types from both engines.
pub mod prelude {
    pub use crate::error::{RetrieveError, RetrieveResult};
    pub use crate::image::{
        build_image_index, Codebook, ImageBuildSummary, ImageRetriever, ImageSearchHit,
        SearchMode, VocabularyConfig, VocabularyTrainer,
    };
    pub use crate::persistence::{Directory, FsDirectory};
    pub use crate::text::{
        build_from_csv, BuildSummary, FlushPolicy, Language, NormalizeConfig, Normalizer,
        SearchHit, SpimiConfig, TextRetriever,
    };
    pub use crate::topk::{ScoredId, TopK};
}
