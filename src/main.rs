mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pleme_depot::config;
use pleme_depot::domain::ConflictResolutionMode;
use pleme_depot::logging::{self, LogFormat};

#[derive(Parser)]
#[command(
    name = "depot",
    version,
    about = "Lease-guarded deployment repository for service fleets"
)]
struct Cli {
    /// Path to config file (default: ~/.config/depot/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (default: warn for CLI runs, daemon.log_level for the daemon)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch or publish the fleet deployment config
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Inspect or update the shared deployment status
    Status {
        #[command(subcommand)]
        command: StatusCommands,
    },

    /// Upload, download, or remove application binaries
    Binaries {
        #[command(subcommand)]
        command: BinariesCommands,
    },

    /// Run the depot daemon (status heartbeat + REST)
    Daemon {
        /// HTTP listen address (overrides config)
        #[arg(long)]
        http_addr: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the deployment config (empty if none was published)
    Fetch {
        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Publish a deployment config file
    Publish {
        /// File whose contents become the new config
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum StatusCommands {
    /// Show reported deployments
    Show {
        #[arg(long)]
        cluster: Option<String>,

        #[arg(long)]
        instance: Option<String>,

        /// Output format (table or json)
        #[arg(long, default_value = "table")]
        format: String,
    },
    /// Report that an instance runs an app version
    Report {
        #[arg(long)]
        app: String,

        #[arg(long)]
        version: String,

        /// Cluster id (defaults to node.cluster_id)
        #[arg(long)]
        cluster: Option<String>,

        /// Instance id (defaults to node.instance_id)
        #[arg(long)]
        instance: Option<String>,
    },
    /// Remove an instance's report for an app version
    Remove {
        #[arg(long)]
        app: String,

        #[arg(long)]
        version: String,

        #[arg(long)]
        cluster: Option<String>,

        #[arg(long)]
        instance: Option<String>,
    },
}

#[derive(Subcommand)]
enum BinariesCommands {
    /// Upload a local directory as an app version's binaries
    Upload {
        id: String,
        version: String,
        path: PathBuf,

        /// fail-if-exists, do-nothing-if-exists, or overwrite
        #[arg(long, default_value_t = ConflictResolutionMode::FailIfExists)]
        mode: ConflictResolutionMode,
    },
    /// Download an app version's binaries into a local directory
    Download {
        id: String,
        version: String,
        path: PathBuf,

        /// fail-if-exists, do-nothing-if-exists, or overwrite
        #[arg(long, default_value_t = ConflictResolutionMode::FailIfExists)]
        mode: ConflictResolutionMode,
    },
    /// Delete an app version's binaries
    Delete { id: String, version: String },
    /// Check whether an app version's binaries exist
    Exists { id: String, version: String },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;

    if !matches!(cli.command, Commands::Daemon { .. }) {
        logging::init(cli.log_level.as_deref().unwrap_or("warn"), LogFormat::Text);
    }

    match cli.command {
        Commands::Config { command } => match command {
            ConfigCommands::Fetch { output } => commands::config::fetch(&cfg, output.as_deref()),
            ConfigCommands::Publish { file } => commands::config::publish(&cfg, &file),
        },
        Commands::Status { command } => match command {
            StatusCommands::Show {
                cluster,
                instance,
                format,
            } => commands::status::show(&cfg, cluster.as_deref(), instance.as_deref(), &format),
            StatusCommands::Report {
                app,
                version,
                cluster,
                instance,
            } => commands::status::report(&cfg, &app, &version, cluster, instance),
            StatusCommands::Remove {
                app,
                version,
                cluster,
                instance,
            } => commands::status::remove(&cfg, &app, &version, cluster, instance),
        },
        Commands::Binaries { command } => match command {
            BinariesCommands::Upload {
                id,
                version,
                path,
                mode,
            } => commands::binaries::upload(&cfg, &id, &version, &path, mode),
            BinariesCommands::Download {
                id,
                version,
                path,
                mode,
            } => commands::binaries::download(&cfg, &id, &version, &path, mode),
            BinariesCommands::Delete { id, version } => {
                commands::binaries::delete(&cfg, &id, &version)
            }
            BinariesCommands::Exists { id, version } => {
                commands::binaries::exists(&cfg, &id, &version)
            }
        },
        Commands::Daemon { http_addr } => commands::daemon::run(cfg, http_addr, cli.log_level),
    }
}
