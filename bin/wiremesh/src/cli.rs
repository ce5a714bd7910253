use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use uuid::Uuid;
use wiremesh_observability::LogFormat;

/// WireGuard mesh coordinator and host agent
#[derive(Parser)]
#[command(name = "wiremesh")]
#[command(version, about = "WireGuard mesh coordinator and host agent")]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    /// Enable verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub(crate) verbose: u8,

    /// Log format: pretty, json or compact (default: pretty on a terminal, json otherwise)
    #[arg(long, global = true, env = "WIREMESH_LOG_FORMAT")]
    pub(crate) log_format: Option<LogFormat>,

    /// Also write JSON logs to daily files in this directory
    #[arg(long, global = true, env = "WIREMESH_LOG_DIR")]
    pub(crate) log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the coordinator API server
    Server {
        /// Bind address
        #[arg(long, default_value = "0.0.0.0:8080", env = "WIREMESH_BIND")]
        bind: SocketAddr,

        /// JWT secret for authentication
        #[arg(long, env = "WIREMESH_JWT_SECRET")]
        jwt_secret: Option<String>,

        /// redb database file; in-memory storage when omitted
        #[arg(long, env = "WIREMESH_DB")]
        db: Option<PathBuf>,

        /// Seconds between address pool rebuilds
        #[arg(long, default_value = "60", env = "WIREMESH_RECONCILE_INTERVAL")]
        reconcile_interval: u64,

        /// Page size used when assembling host settings
        #[arg(long, default_value = "100")]
        sync_page_size: u32,
    },

    /// Run the host agent
    Agent {
        /// Coordinator base URL
        #[arg(long, env = "WIREMESH_SERVER")]
        server: String,

        /// Host token issued by the coordinator
        #[arg(long, env = "WIREMESH_TOKEN", hide_env_values = true)]
        token: String,

        /// Directory for persisted settings and keys
        #[arg(long, default_value = "/var/lib/wiremesh", env = "WIREMESH_DATA_DIR")]
        data_dir: PathBuf,

        /// Seconds between synchronizations
        #[arg(long, default_value = "30", env = "WIREMESH_SYNC_INTERVAL")]
        sync_interval: u64,

        /// Seconds before a coordinator request is abandoned
        #[arg(long, default_value = "10")]
        request_timeout: u64,
    },

    /// Token management
    #[command(subcommand)]
    Token(TokenCommands),
}

#[derive(Subcommand)]
pub(crate) enum TokenCommands {
    /// Create an operator token for the management API
    Admin {
        /// Token subject (operator name)
        #[arg(long, default_value = "admin")]
        subject: String,

        #[command(flatten)]
        common: TokenArgs,
    },

    /// Create a host token for an agent
    Host {
        /// Host ID the agent acts as
        host_id: Uuid,

        #[command(flatten)]
        common: TokenArgs,
    },
}

#[derive(clap::Args)]
pub(crate) struct TokenArgs {
    /// JWT secret (must match the server)
    #[arg(long, env = "WIREMESH_JWT_SECRET")]
    pub(crate) secret: Option<String>,

    /// Token lifetime in hours
    #[arg(long, default_value = "8760")]
    pub(crate) hours: u64,

    /// Print only the token
    #[arg(short, long)]
    pub(crate) quiet: bool,
}
