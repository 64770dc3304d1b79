mod bm25_index;
mod catalog;
mod file_index;
mod fuzzy_index;

pub use bm25_index::*;
pub use catalog::*;
pub use file_index::*;
pub use fuzzy_index::*;
