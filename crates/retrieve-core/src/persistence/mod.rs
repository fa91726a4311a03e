//! Disk persistence for textual and image indexes.
//!
//! Both engines persist to plain-text / line-delimited-JSON artifacts rather than
//! a packed binary segment format, so the files double as a debugging surface. The
//! [`directory::Directory`] trait keeps the writers and readers agnostic to the
//! backing storage (filesystem in production, an in-memory directory in tests).

pub mod directory;
pub mod error;

pub use directory::{Directory, FsDirectory, ReadSeek};
pub use error::{PersistenceError, PersistenceResult};
