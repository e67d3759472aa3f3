mod repl;

use std::{
    fs, io,
    path::{Path, PathBuf},
    process,
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use xper::{new_interpreter_with, Engine, Limits};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    options: Options,
}

#[derive(Subcommand)]
enum Commands {
    /// run a file
    Run {
        #[arg(name = "FILE")]
        file: PathBuf,
    },
    /// start an interactive session
    Repl,
    /// evaluate the given code
    Eval {
        #[arg(name = "CODE", required = true)]
        code: Vec<String>,
    },
}

#[derive(Args, Clone, Copy)]
pub struct Options {
    /// print the tokens and syntax tree of every input
    #[arg(long, global = true)]
    debug: bool,

    /// print the most recent results after every input
    #[arg(long, global = true)]
    stack: bool,

    /// maximum number of live bindings
    #[arg(long, global = true, default_value_t = Limits::default().max_bindings)]
    max_bindings: usize,

    /// maximum number of iterations of a single loop
    #[arg(long, global = true, default_value_t = Limits::default().max_iterations)]
    max_iterations: usize,

    /// maximum depth of nested function calls
    #[arg(long, global = true, default_value_t = Limits::default().max_call_depth)]
    max_call_depth: usize,
}

impl Options {
    pub fn engine(&self) -> Box<dyn Engine> {
        new_interpreter_with(Limits {
            max_bindings: self.max_bindings,
            max_iterations: self.max_iterations,
            max_call_depth: self.max_call_depth,
            ..Limits::default()
        })
    }
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command {
        Some(Commands::Run { file }) => run_file(&file, cli.options),
        Some(Commands::Eval { code }) => run_source(&code.join(" "), cli.options),
        Some(Commands::Repl) | None => repl::start(cli.options),
    };

    if let Err(err) = result {
        eprintln!("{:#}", err);
        process::exit(1);
    }
}

/// Logging is off unless `RUST_LOG` is set.
fn init_tracing() {
    if std::env::var("RUST_LOG").is_err() {
        return;
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();
}

fn run_file(file: &Path, options: Options) -> Result<()> {
    let source = fs::read_to_string(file)
        .with_context(|| format!("could not read {}", file.display()))?;
    run_source(&source, options)
}

fn run_source(source: &str, options: Options) -> Result<()> {
    if options.debug {
        repl::describe(source)?;
    }

    let mut engine = options.engine();
    let result = engine.run(source)?;
    println!("{}", result);

    if options.stack {
        repl::print_trace(engine.as_ref());
    }
    Ok(())
}
