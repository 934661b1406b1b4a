use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use kvx::model::SortField;

mod cli_exec;

#[derive(Parser)]
#[command(name = "kvx")]
#[command(about = "Browse and edit Workers KV namespaces", long_about = None)]
struct Cli {
    /// Path to a JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage remembered project folders
    Folders {
        #[command(subcommand)]
        command: FolderCommands,
    },

    /// Work with the local KV state of a Wrangler project
    Local {
        /// Project folder containing .wrangler/state
        path: PathBuf,

        #[command(subcommand)]
        action: Action,
    },

    /// Work with a Cloudflare account
    Remote {
        #[arg(long, env = "CLOUDFLARE_ACCOUNT_ID")]
        account: String,

        #[arg(long, env = "CLOUDFLARE_API_TOKEN", hide_env_values = true)]
        token: String,

        #[command(subcommand)]
        action: Action,
    },
}

#[derive(Subcommand)]
enum FolderCommands {
    /// List remembered folders and their namespaces
    List,

    /// Remember a project folder
    Add { path: PathBuf },

    /// Forget a folder by id
    Remove { folder_id: String },
}

#[derive(Subcommand)]
enum Action {
    /// List namespaces
    Namespaces,

    /// List keys in a namespace
    Keys {
        namespace: String,

        #[arg(long, value_enum, default_value_t = SortArg::Key)]
        sort: SortArg,

        /// Sort descending
        #[arg(long)]
        desc: bool,
    },

    /// Print the value stored under a key
    Get { namespace: String, key: String },

    /// Replace the value of an existing key with a JSON document
    Put {
        namespace: String,
        key: String,
        value: String,
    },

    /// Delete keys
    Delete {
        namespace: String,
        #[arg(required = true)]
        keys: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Key,
    Expiration,
}

impl From<SortArg> for SortField {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Key => SortField::Key,
            SortArg::Expiration => SortField::Expiration,
        }
    }
}

fn main() {
    kvx::logging::init_logging();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let runtime = tokio::runtime::Runtime::new().context("start async runtime")?;
    runtime.block_on(cli_exec::handle_command(cli))
}
