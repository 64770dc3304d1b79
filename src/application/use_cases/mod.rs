mod chunk_file;
mod crawl;
mod dependency_scout;
mod fusion;
mod plan_index;
mod run_index;
mod search_code;
mod summarize;

pub use chunk_file::*;
pub use crawl::*;
pub use dependency_scout::*;
pub use fusion::*;
pub use plan_index::*;
pub use run_index::*;
pub use search_code::*;
pub use summarize::*;
