//! stackless command-line driver
//!
//! Loads a program from its JSON form, applies the stackless transform and
//! either prints the result, dumps the resume table or runs an entry
//! function on the reference executor.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use stackless_engine::{Config, OracleKind};

#[derive(Parser)]
#[command(name = "stackless")]
#[command(about = "Stackless transform for flow-graph programs", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (stackless.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the frame depth limit
    #[arg(long, global = true)]
    depth_limit: Option<usize>,

    /// Override the suspend oracle (all-calls, no-calls, call-graph)
    #[arg(long, global = true)]
    oracle: Option<OracleKind>,

    /// Log transform and runtime decisions to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Colored output: auto, always, never
    #[arg(long, global = true)]
    color: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Transform a program and print the rewritten graphs
    Transform {
        /// Program in JSON form
        file: PathBuf,
        /// Write the transformed program as JSON instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Also print the resume table
        #[arg(long)]
        table: bool,
    },

    /// Transform a program and run one of its functions
    Run {
        /// Program in JSON form
        file: PathBuf,
        /// Function to call
        #[arg(short, long, default_value = "main")]
        entry: String,
        /// Arguments, parsed by the entry's parameter types
        #[arg(allow_negative_numbers = true)]
        args: Vec<String>,
    },

    /// Print the resume table and frame layouts of a transformed program
    Table {
        /// Program in JSON form
        file: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .try_init();
}

impl Cli {
    /// Config file settings with command-line overrides applied
    fn config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(limit) = self.depth_limit {
            config.runtime.depth_limit = Some(limit);
        }
        if let Some(oracle) = self.oracle {
            config.transform.oracle = oracle;
        }
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli.config()?;
    let color = output::resolve_color_choice(cli.color.as_deref());

    match cli.command {
        Commands::Transform {
            file,
            output,
            table,
        } => commands::transform::execute(&file, output.as_deref(), table, &config, color),
        Commands::Run { file, entry, args } => {
            commands::run::execute(&file, &entry, &args, &config, color)
        }
        Commands::Table { file } => commands::table::execute(&file, &config, color),
    }
}
