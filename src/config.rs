use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Plan Snapshot: extracts a point-in-time test plan snapshot with quality metrics.
#[derive(Parser, Debug, Clone)]
#[command(name = "plan-snapshot")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Extract one snapshot and write it as JSON
    Extract(ExtractArgs),
    /// Serve extractions over HTTP
    Serve(ServeArgs),
}

/// Connection and tuning flags shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Organization or collection URL of the test-management service
    #[arg(long = "org-url")]
    pub org_url: String,

    /// Accept self-signed TLS certificates (on-premises servers)
    #[arg(long = "on-premises")]
    pub on_premises: bool,

    /// REST API version sent with every request
    #[arg(long = "api-version", default_value = DEFAULT_API_VERSION)]
    pub api_version: String,

    /// Maximum suites whose test cases are fetched concurrently
    #[arg(long = "suite-concurrency", default_value_t = DEFAULT_SUITE_CONCURRENCY)]
    pub suite_concurrency: usize,

    /// Number of recent runs reconstructed into history
    #[arg(long = "history-limit", default_value_t = HISTORY_RUN_LIMIT)]
    pub history_limit: usize,

    /// Pick the latest run by start date instead of listing order
    #[arg(long = "sort-runs-by-date")]
    pub sort_runs_by_date: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Project name or id
    #[arg(short = 'p', long = "project")]
    pub project: String,

    /// Test plan id
    #[arg(long = "plan-id")]
    pub plan_id: u64,

    /// Write the snapshot here instead of stdout
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// HTTP port
    #[arg(long = "port", default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

/// Runtime configuration derived from the CLI.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub org_url: String,
    pub on_premises: bool,
    pub api_version: String,
    pub suite_concurrency: usize,
    pub history_limit: usize,
    pub sort_runs_by_date: bool,
    pub port: u16,
}

// Server constants
pub const DEFAULT_PORT: u16 = 9880;

// Transport constants
pub const DEFAULT_API_VERSION: &str = "7.1";
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
pub const TOKEN_ENV_VAR: &str = "PLAN_SNAPSHOT_TOKEN";

// Pagination constants
pub const PAGE_SIZE: usize = 100;
pub const PAGINATION_SKIP_CEILING: usize = 5000;

// Aggregation constants
pub const RUN_LIST_TOP: usize = 100;
pub const HISTORY_RUN_LIMIT: usize = 10;
pub const DEFAULT_SUITE_CONCURRENCY: usize = 4;

// Metrics constants
pub const ALERT_PASS_RATE_THRESHOLD: u8 = 80;

impl ExtractorConfig {
    pub fn from_connection_args(args: ConnectionArgs, port: u16) -> Self {
        ExtractorConfig {
            org_url: args.org_url,
            on_premises: args.on_premises,
            api_version: args.api_version,
            suite_concurrency: args.suite_concurrency.max(1),
            history_limit: args.history_limit,
            sort_runs_by_date: args.sort_runs_by_date,
            port,
        }
    }
}
