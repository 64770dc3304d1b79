//! # Connector Layer
//!
//! External integrations implementing the application ports:
//! - Parsing (tree-sitter façade over the supported language set)
//! - Storage (DuckDB vector store, redb task store, JSON/binary indexes)
//! - Embedding backends (deterministic mock, HTTP)
//! - Git change detection
//! - The typed tool dispatcher exposed to orchestrators

pub mod adapter;
pub mod storage;
pub mod tools;

pub use adapter::*;
pub use storage::*;
pub use tools::*;
