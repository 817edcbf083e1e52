use std::path::PathBuf;

use clap::{ArgAction, Parser};

/// Command-line surface. Every mirror setting can also come from the
/// environment or the config file; flags win.
#[derive(Clone, Debug, Default, Parser)]
#[command(
    name = "capstan",
    version = env!("CARGO_PKG_VERSION"),
    about = "Keep a minimal local mirror of a CPAN-style package repository",
    long_about = None
)]
pub struct Cli {
    /// Local mirror root directory.
    #[arg(short, long, env = "CAPSTAN_LOCAL", value_name = "DIR")]
    pub local: Option<PathBuf>,

    /// Remote repository base URL.
    #[arg(short, long, env = "CAPSTAN_REMOTE", value_name = "URL")]
    pub remote: Option<String>,

    /// Configuration file (default: ~/.capstan.toml).
    #[arg(short, long, env = "CAPSTAN_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Re-verify archives that are already present locally.
    #[arg(short, long)]
    pub force: bool,

    /// Do not contact the remote at all.
    #[arg(long)]
    pub offline: bool,

    /// Keep every local file, mirrored or not.
    #[arg(long)]
    pub exact: bool,

    /// Skip the cleanup pass entirely.
    #[arg(long)]
    pub skip_cleanup: bool,

    /// Leave source-control metadata (.git, .svn, .hg, CVS) alone
    /// during cleanup.
    #[arg(long)]
    pub ignore_source_control: bool,

    /// Mirror the perl language distributions too.
    #[arg(long)]
    pub include_perl: bool,

    /// Per-request timeout in seconds (requests never time out if
    /// omitted).
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Log less (-q warnings only, -qq errors only).
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "verbose")]
    pub quiet: u8,

    /// Log more (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}
