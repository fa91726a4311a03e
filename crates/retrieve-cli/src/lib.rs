//! Command-line facade over `retrieve-core`'s textual and image engines.
//!
//! Mirrors the donor's `rank-rank` split: the actual argument-to-library
//! wiring lives in [`commands`] so it stays testable without spawning a
//! subprocess, and the binary in `src/bin/` only parses `clap` arguments
//! and forwards them here.

pub mod commands;

pub use commands::{run_image_build, run_image_search, run_text_build, run_text_search};
