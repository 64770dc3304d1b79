//! # CodeScout
//!
//! A codebase retrieval engine: it ingests a source repository, decomposes
//! files into semantic chunks with cross-reference metadata, embeds them,
//! and answers hybrid (vector + lexical + fuzzy-symbol) queries alongside
//! import-graph navigation, so a coding assistant can find things without
//! reading whole files.
//!
//! ## Architecture
//!
//! The crate is organized following Domain-Driven Design principles:
//!
//! - `domain`: Core models and errors
//! - `application`: Ports, use cases and the indexing pipeline
//! - `connector`: External integrations (tree-sitter, DuckDB, redb, git,
//!   embedding backends, tool dispatcher)

pub mod application;
pub mod connector;
pub mod domain;

// Re-export commonly used types
pub use application::*;
pub use connector::*;
pub use domain::*;
