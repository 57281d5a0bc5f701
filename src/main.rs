use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use modman::cli;

#[derive(Parser)]
#[command(name = "modman")]
#[command(about = "Git-backed project module manager", long_about = None)]
struct Cli {
    /// Project root directory
    #[arg(short = 'C', long, default_value = ".")]
    project: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve and install the modules declared in the project manifest
    Init {
        /// Manifest file (defaults to modman.json in the project root)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Directory for temporary clones (defaults to the system temp dir)
        #[arg(long)]
        clone_dir: Option<PathBuf>,
    },
    /// Re-run refresh capabilities for installed modules
    Refresh {
        /// Refresh a single module instead of all of them
        #[arg(short, long)]
        module: Option<String>,
        /// Number of modules refreshed concurrently
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
    },
    /// List installed modules
    List,
    /// Show one module's full descriptor
    Info {
        /// Module name
        #[arg(short, long)]
        module: String,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let root = cli.project;

    let result = match cli.command {
        Commands::Init { config, clone_dir } => cli::cmd_init(&root, config, clone_dir).await,
        Commands::Refresh {
            module,
            concurrency,
        } => cli::cmd_refresh(&root, module.as_deref(), concurrency).await,
        Commands::List => cli::cmd_list(&root),
        Commands::Info { module } => cli::cmd_info(&root, &module),
        Commands::Version => {
            println!("modman {}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
    };

    // Module-scoped failures exit 2; run-level errors (bad manifest,
    // dependency cycle, version conflict) exit 1.
    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
