use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;

mod commands;

#[derive(Parser)]
#[command(name = "scd")]
#[command(about = "SCD type 2 snapshot reconciliation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> overlays)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Validate a table config and print its resolved settings
    Check {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Treat config keys nothing reads as an error
        #[arg(long, default_value_t = false)]
        fail_unused: bool,
    },

    /// Sync dated snapshot files into an in-memory table and print the
    /// resulting intervals. No database involved.
    Replay {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// DATE=PATH, applied in the order given
        #[arg(long = "sync", required = true)]
        syncs: Vec<String>,

        /// Input format; inferred from the file extension when omitted
        #[arg(long, value_enum)]
        format: Option<InputFormat>,

        /// Also print the reconstructed snapshot for this date
        #[arg(long)]
        get: Option<String>,
    },

    /// Sync one snapshot file into the Postgres table
    Sync {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// As-of date of the snapshot (YYYY-MM-DD)
        #[arg(long)]
        date: String,

        /// CSV or JSON records file
        #[arg(long)]
        input: String,

        #[arg(long, value_enum)]
        format: Option<InputFormat>,
    },

    /// Print the snapshot as of a date, as CSV
    Get {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        #[arg(long)]
        date: String,
    },

    /// Print every synced date, ascending
    Dates {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },

    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    /// Connectivity and table presence
    Status {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },

    /// Create the table and its sync log (and presence table). Idempotent.
    Init {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum InputFormat {
    Csv,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Dev-time convenience: a missing file is fine.
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = scd_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Check {
            config_paths,
            fail_unused,
        } => commands::check(&config_paths, fail_unused)?,

        Commands::Replay {
            config_paths,
            syncs,
            format,
            get,
        } => commands::replay::replay(&config_paths, &syncs, format, get.as_deref())?,

        Commands::Sync {
            config_paths,
            date,
            input,
            format,
        } => commands::table::sync(&config_paths, &date, &input, format).await?,

        Commands::Get { config_paths, date } => commands::table::get(&config_paths, &date).await?,

        Commands::Dates { config_paths } => commands::table::dates(&config_paths).await?,

        Commands::Db { cmd } => match cmd {
            DbCmd::Status { config_paths } => commands::table::status(&config_paths).await?,
            DbCmd::Init { config_paths } => commands::table::init(&config_paths).await?,
        },
    }

    debug!("done");
    Ok(())
}

fn init_tracing() {
    // Logs go to stderr; stdout carries command output only.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
