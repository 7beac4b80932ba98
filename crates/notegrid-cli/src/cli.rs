use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "notegrid")]
#[command(about = "Mirror a Notion database as an ordered image grid")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Optional path to the local grid cache
    #[arg(long, global = true, value_name = "PATH")]
    pub cache_path: Option<PathBuf>,

    /// Notion integration token
    #[arg(
        long,
        global = true,
        env = "NOTION_TOKEN",
        hide_env_values = true,
        value_name = "TOKEN"
    )]
    pub notion_token: Option<String>,

    /// Supabase user id for the per-user grid table (needs SUPABASE_ACCESS_TOKEN)
    #[arg(long, global = true, value_name = "ID")]
    pub user_id: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one sync cycle for a database
    Sync {
        /// Notion database id
        database: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Keep syncing a database on an interval until interrupted
    Watch {
        /// Notion database id
        database: String,
        /// Seconds between cycles; overrides the grid's stored auto-sync preferences
        #[arg(long, value_name = "SECS")]
        interval: Option<u64>,
    },
    /// Check whether upstream changed since a known hash, without writing
    Check {
        /// Notion database id
        database: String,
        /// Hash from a previous sync or check
        #[arg(long, value_name = "HASH")]
        last_hash: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the stored grid without contacting Notion
    Show {
        /// Notion database id
        database: String,
        /// Number of items to show (defaults to the grid's visible count)
        #[arg(short, long)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Move items to the front of the grid in the given order
    Reorder {
        /// Notion database id
        database: String,
        /// Record ids in the desired order; unnamed items keep their relative order
        #[arg(required = true)]
        ids: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the databases shared with the Notion integration
    Databases {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
