use std::io;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use pklsense::commands;
use pklsense::{Config, GrammarVersion, Workspace};

#[derive(Parser)]
#[command(name = "pklsense")]
#[command(about = "Resolve, type-check and tidy Pkl modules", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    /// Configuration file (default: nearest pklsense.toml)
    #[arg(short, long, env = "PKLSENSE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Workspace directory holding module snapshots
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report diagnostics for modules (all loaded modules by default)
    Check {
        paths: Vec<PathBuf>,

        /// Emit JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve the reference at a byte offset
    Resolve {
        path: PathBuf,

        #[arg(short, long)]
        offset: usize,

        #[arg(long)]
        json: bool,
    },

    /// Print the optimized import list of a module
    OptimizeImports {
        path: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Format a source file with the external pkl formatter
    Format {
        path: PathBuf,

        /// Grammar version (default from configuration)
        #[arg(short, long, value_enum)]
        grammar_version: Option<GrammarVersion>,
    },

    /// Show the module dependency graph
    Graph {
        #[arg(long)]
        json: bool,
    },

    /// Compare two type annotations
    Subtype {
        left: String,
        right: String,

        /// Module whose scope the annotations are resolved in
        #[arg(short, long)]
        module: Option<PathBuf>,
    },
}

fn init_tracing(cli: &Cli) {
    if std::env::var_os("PKLSENSE_LOG").is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_env("PKLSENSE_LOG"))
            .with_writer(io::stderr)
            .init();
        return;
    }
    let level = if cli.debug {
        tracing::Level::TRACE
    } else if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(cli.debug)
        .with_writer(io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    if let Some(path) = &cli.config {
        return Config::from_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()));
    }
    let start = cli
        .root
        .canonicalize()
        .with_context(|| format!("Workspace {} does not exist", cli.root.display()))?;
    Ok(Config::discover(&start)?
        .map(|(_, config)| config)
        .unwrap_or_default())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let config = load_config(&cli)?;
    debug!("configuration: {:?}", config);
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if let Commands::Format {
        path,
        grammar_version,
    } = &cli.command
    {
        return commands::format(&config, path, *grammar_version, &mut out);
    }

    let root = cli.root.clone();
    let workspace = tokio::task::spawn_blocking(move || Workspace::open(&root, config))
        .await
        .context("Workspace loading task failed")??;

    match cli.command {
        Commands::Check { paths, json } => {
            let found = commands::check(&workspace, &paths, json, &mut out)?;
            if found > 0 {
                bail!("{} problem(s) found", found);
            }
            Ok(())
        }
        Commands::Resolve { path, offset, json } => {
            commands::resolve(&workspace, &path, offset, json, &mut out)
        }
        Commands::OptimizeImports { path, json } => {
            commands::optimize_imports(&workspace, &path, json, &mut out)
        }
        Commands::Graph { json } => commands::graph(&workspace, json, &mut out),
        Commands::Subtype {
            left,
            right,
            module,
        } => commands::subtype(&workspace, &left, &right, module.as_deref(), &mut out),
        Commands::Format { .. } => Ok(()),
    }
}
