//! rbmarshal CLI
//!
//! Inspect and verify marshal 4.8 files from the command line.

mod session;

use clap::{Args, CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};
use session::{CheckOutcome, LoadOptions};
use std::io;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "rbmarshal")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect and verify marshal 4.8 binary files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct LoadArgs {
    /// Path to a marshal configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum nesting depth (overrides the config file)
    #[arg(long, value_name = "N")]
    max_depth: Option<usize>,

    /// Freeze loaded objects and deduplicate equal strings
    #[arg(long)]
    freeze: bool,
}

impl From<LoadArgs> for LoadOptions {
    fn from(args: LoadArgs) -> Self {
        LoadOptions {
            config: args.config,
            max_depth: args.max_depth,
            freeze: args.freeze,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Load a marshal file and print its contents
    Inspect {
        /// Input marshal file
        input: PathBuf,

        /// Pretty-print nested values across lines
        #[arg(long)]
        pretty: bool,

        #[command(flatten)]
        load: LoadArgs,
    },

    /// Load a marshal file, dump it again and compare the bytes
    Check {
        /// Input marshal file
        input: PathBuf,

        #[command(flatten)]
        load: LoadArgs,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rbmarshal=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect {
            input,
            pretty,
            load,
        } => run_inspect(&input, &load.into(), pretty),
        Commands::Check { input, load } => run_check(&input, &load.into()),
        Commands::Completions { shell } => run_completions(shell),
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "rbmarshal", &mut io::stdout());
}

fn run_inspect(input: &std::path::Path, options: &LoadOptions, pretty: bool) {
    match session::inspect_file(input, options, pretty) {
        Ok(text) => println!("{}", text),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn run_check(input: &std::path::Path, options: &LoadOptions) {
    match session::check_file(input, options) {
        Ok(CheckOutcome::Identical { len }) => {
            println!("{}: OK ({} bytes round-trip identically)", input.display(), len);
        }
        Ok(CheckOutcome::Differs {
            offset,
            original_len,
            redumped_len,
        }) => {
            println!(
                "{}: re-dumped bytes differ at offset {} ({} bytes in, {} bytes out)",
                input.display(),
                offset,
                original_len,
                redumped_len
            );
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
