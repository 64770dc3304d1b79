use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Index the project (incremental by default)
    Index {
        /// Force a full re-index instead of the incremental plan
        #[arg(short, long)]
        full: bool,

        /// Also index files with uncommitted changes
        #[arg(short, long)]
        uncommitted: bool,

        /// Plan only; print what would be done without executing
        #[arg(long)]
        dry_run: bool,
    },

    /// Hybrid search over the indexed codebase
    Search {
        query: String,

        #[arg(long, default_value = "10")]
        num: usize,

        #[arg(short, long)]
        min_score: Option<f32>,

        #[arg(short = 'L', long)]
        language: Option<Vec<String>>,

        /// Filter by construct kind (function, class, struct, …)
        #[arg(short, long)]
        kind: Option<Vec<String>>,
    },

    /// Locate a symbol's definitions and call sites
    Symbol {
        name: String,

        /// Entry points for the dependency walk (defaults to the project
        /// root's source files)
        #[arg(short, long)]
        entry: Vec<String>,
    },

    /// Build and print the import graph for the given entry points
    Deps {
        entry: Vec<String>,

        #[arg(long, default_value = "50")]
        max_depth: usize,

        #[arg(long)]
        include_node_modules: bool,
    },

    /// Print a bounded architectural summary
    Summarize {
        #[arg(long, default_value = "")]
        scope: String,

        #[arg(long, default_value = "2")]
        depth: usize,

        #[arg(long)]
        focus: Vec<String>,

        #[arg(long, default_value = "1024")]
        max_tokens: usize,
    },

    /// Dispatch a raw JSON tool request (the orchestrator boundary)
    Tool {
        /// JSON object: {"tool": "...", "args": {...}}
        request: String,
    },

    /// Show index statistics
    Stats,
}
