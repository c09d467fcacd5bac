use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use schemaflow::commands::{self, DriftArgs};
use schemaflow::config::{self, ConfigInput, DatabaseArgs, RunnerArgs};
use schemaflow::constants::CONFIG_FILENAME;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(long, default_value = CONFIG_FILENAME, global = true)]
    config_file: String,

    /// Enable verbose output (info level)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress all non-essential output (error level only)
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Enable debug output (debug level)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply every outstanding migration
    Up {
        /// Schemas to migrate (defaults to every configured schema)
        #[arg(long = "schema", value_delimiter = ',')]
        schemas: Vec<String>,

        #[command(flatten)]
        database_args: DatabaseArgs,

        #[command(flatten)]
        runner_args: RunnerArgs,
    },

    /// Apply migrations up to and including the given targets
    Upto {
        #[arg(long)]
        schema: String,

        /// Migration IDs to reach
        #[arg(long = "target", value_delimiter = ',', required = true)]
        targets: Vec<i64>,

        #[command(flatten)]
        database_args: DatabaseArgs,

        #[command(flatten)]
        runner_args: RunnerArgs,
    },

    /// Unapply every migration that depends on the given targets
    Down {
        #[arg(long)]
        schema: String,

        /// Migration IDs to keep as the newest applied migrations
        #[arg(long = "target", value_delimiter = ',', required = true)]
        targets: Vec<i64>,

        #[command(flatten)]
        database_args: DatabaseArgs,

        #[command(flatten)]
        runner_args: RunnerArgs,
    },

    /// Unapply the most recent migration
    Undo {
        #[arg(long)]
        schema: String,

        #[command(flatten)]
        database_args: DatabaseArgs,

        #[command(flatten)]
        runner_args: RunnerArgs,
    },

    /// Check that every migration is applied (for CI and deploy gates)
    Validate {
        /// Schemas to check (defaults to every configured schema)
        #[arg(long = "schema", value_delimiter = ',')]
        schemas: Vec<String>,

        #[command(flatten)]
        database_args: DatabaseArgs,
    },

    /// Print the live description of a schema's database as JSON
    Describe {
        #[arg(long)]
        schema: String,

        /// Write the description to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,

        #[command(flatten)]
        database_args: DatabaseArgs,
    },

    /// Compare a schema's database against an expected snapshot
    Drift {
        #[command(flatten)]
        args: DriftArgs,

        #[command(flatten)]
        database_args: DatabaseArgs,
    },
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    let cli = Cli::parse();
    initialize_logging(&cli);

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_shutdown_signal(cancel.clone()));

    if let Err(e) = run_main(cli, &cancel).await {
        eprintln!("Error: {:#}", e);
        commands::print_error_instructions(&e);
        std::process::exit(1);
    }
}

async fn cancel_on_shutdown_signal(cancel: CancellationToken) {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal, cancelling...");
    cancel.cancel();
}

fn initialize_logging(cli: &Cli) {
    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        "warn" // default level
    };

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(level)
    };

    fmt().with_env_filter(filter).with_target(false).init();
}

fn cli_input(database_args: &DatabaseArgs, runner_args: Option<&RunnerArgs>) -> ConfigInput {
    ConfigInput {
        runner: runner_args.map(|args| args.clone().into()),
        ..ConfigInput::from(database_args.clone())
    }
}

async fn run_main(cli: Cli, cancel: &CancellationToken) -> Result<()> {
    let (file_config, root_dir) = config::load_config(&cli.config_file)?;

    let (database_args, runner_args) = match &cli.command {
        Commands::Up {
            database_args,
            runner_args,
            ..
        }
        | Commands::Upto {
            database_args,
            runner_args,
            ..
        }
        | Commands::Down {
            database_args,
            runner_args,
            ..
        }
        | Commands::Undo {
            database_args,
            runner_args,
            ..
        } => (database_args, Some(runner_args)),
        Commands::Validate { database_args, .. }
        | Commands::Describe { database_args, .. }
        | Commands::Drift { database_args, .. } => (database_args, None),
    };

    let config = config::ConfigBuilder::new()
        .with_file(file_config)
        .with_cli_args(cli_input(database_args, runner_args))
        .resolve()?;

    match &cli.command {
        Commands::Up { schemas, .. } => {
            info!("Applying outstanding migrations");
            commands::cmd_up(&config, &root_dir, cancel, schemas).await
        }
        Commands::Upto {
            schema, targets, ..
        } => {
            info!("Migrating {} up to {:?}", schema, targets);
            commands::cmd_upto(&config, &root_dir, cancel, schema, targets).await
        }
        Commands::Down {
            schema, targets, ..
        } => {
            info!("Migrating {} down to {:?}", schema, targets);
            commands::cmd_down(&config, &root_dir, cancel, schema, targets).await
        }
        Commands::Undo { schema, .. } => {
            info!("Reverting the last migration of {}", schema);
            commands::cmd_undo(&config, &root_dir, cancel, schema).await
        }
        Commands::Validate { schemas, .. } => {
            commands::cmd_validate(&config, &root_dir, cancel, schemas).await
        }
        Commands::Describe { schema, out, .. } => {
            commands::cmd_describe(&config, &root_dir, schema, out.as_deref()).await
        }
        Commands::Drift { args, .. } => commands::cmd_drift(&config, &root_dir, args).await,
    }
}
