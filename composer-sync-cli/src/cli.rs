//! CLI argument parsing types using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use composer_sync_core::Namespace;
use serde_json::Value;

use crate::util::parse_key_val;

/// Composer state gateway and repository inspection tool
#[derive(Parser)]
#[command(name = "composer-sync")]
#[command(author, version, about = "Composer state synchronization gateway")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration directory
    #[arg(short, long, global = true, env = "COMPOSER_SYNC_CONFIG_DIR")]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the gateway over stdin/stdout
    #[command(about = "Serve repository requests as JSON lines on stdin/stdout")]
    Serve,

    /// Read a key or a whole namespace
    #[command(about = "Print a repository key, or the whole namespace")]
    Get {
        /// Namespace to read
        #[arg(value_enum)]
        namespace: NamespaceArg,

        /// Key to read; omit for every key
        key: Option<String>,
    },

    /// Patch keys of a namespace
    #[command(about = "Set repository keys from KEY=json pairs")]
    Patch {
        /// Namespace to patch
        #[arg(value_enum)]
        namespace: NamespaceArg,

        /// Entries as KEY=json, e.g. sidebarHidden=true
        #[arg(value_parser = parse_key_val, required = true)]
        entries: Vec<(String, Value)>,
    },

    /// Activate registered credentials
    #[command(about = "Make registered credentials the active identity")]
    Activate {
        /// Credentials id, e.g. api_jdoe
        id: String,
    },

    /// Clear the active identity
    #[command(about = "Sign out of the active identity")]
    Deactivate,

    /// Manage platform credentials
    #[command(subcommand, about = "Manage platform credentials")]
    Credentials(CredentialsCommands),

    /// Manage unsaved edits
    #[command(subcommand, about = "Manage swap entries holding unsaved edits")]
    Swap(SwapCommands),

    /// Refresh platform data for the active identity
    #[command(about = "Fetch projects and apps from the platform")]
    Fetch {
        /// Skip the fetch while the cache is younger than `platform.max_cache_age_secs`
        #[arg(long)]
        if_stale: bool,
    },

    /// Print file content, preferring unsaved edits
    #[command(about = "Print a local file, preferring its swap entry over disk")]
    Content {
        /// Absolute file path
        path: String,
    },
}

/// Repository namespace
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum NamespaceArg {
    /// Machine-wide state
    Local,
    /// State of the active identity
    User,
}

impl From<NamespaceArg> for Namespace {
    fn from(arg: NamespaceArg) -> Self {
        match arg {
            NamespaceArg::Local => Self::Local,
            NamespaceArg::User => Self::User,
        }
    }
}

/// Credentials subcommands
#[derive(Subcommand)]
pub enum CredentialsCommands {
    /// List registered credentials
    #[command(about = "List registered credentials")]
    List,

    /// Register credentials
    #[command(about = "Register or update platform credentials")]
    Add {
        /// Platform API URL
        #[arg(short, long, default_value = "https://api.sbgenomics.com")]
        url: String,

        /// Authentication token (32 hex digits)
        #[arg(short, long, env = "COMPOSER_SYNC_TOKEN", hide_env_values = true)]
        token: String,

        /// Platform username; looked up on the platform when omitted
        #[arg(short = 'n', long)]
        username: Option<String>,

        /// Activate the credentials after registering them
        #[arg(long)]
        activate: bool,
    },

    /// Unregister credentials
    #[command(about = "Remove registered credentials")]
    Remove {
        /// Credentials id
        id: String,
    },
}

/// Swap subcommands
#[derive(Subcommand)]
pub enum SwapCommands {
    /// Store an unsaved edit
    #[command(about = "Store unsaved content for a local path or platform app")]
    Set {
        /// Local absolute path, or `owner/project/app[/revision]`
        item: String,

        /// Content; read from --file when omitted
        content: Option<String>,

        /// Read the content from this file
        #[arg(short, long, conflicts_with = "content")]
        file: Option<PathBuf>,
    },

    /// Drop an unsaved edit
    #[command(about = "Discard the swap entry of an item")]
    Discard {
        /// Local absolute path, or `owner/project/app[/revision]`
        item: String,
    },
}
