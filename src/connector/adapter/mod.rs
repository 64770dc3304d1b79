mod duckdb_vector_repository;
mod git_tracker;
mod http_embedding;
mod mock_embedding;
mod redb_task_store;
mod treesitter_parser;

pub use duckdb_vector_repository::*;
pub use git_tracker::*;
pub use http_embedding::*;
pub use mock_embedding::*;
pub use redb_task_store::*;
pub use treesitter_parser::*;
