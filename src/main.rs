//! seedc — main binary
//!
//! Drives the bootstrap pipeline or any single stage of it.

use clap::{Parser, Subcommand};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use seedc::{Pipeline, Result, ToolchainError};
use seedc_forth::{InputStream, Vm};
use seedc_loader::Loader;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "seedc")]
#[command(about = "Trust-minimized bootstrap toolchain: hex loader, Forth VM, C-subset compiler", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose tracing output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: concatenated stages on stdin, assembly on stdout
    Run,

    /// Hex-load stdin into an executable region and branch into it
    Load,

    /// Interpret Forth source from a file, or stdin if none is given
    Forth {
        /// Forth source file
        input: Option<PathBuf>,
    },

    /// Compile C-subset source to ARM64 assembly
    Compile {
        /// C source file (stdin if omitted)
        input: Option<PathBuf>,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Interactive Forth REPL
    Repl,
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "debug".into()),
            )
            .with_writer(io::stderr)
            .init();
    }

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => cmd_run(),
        Commands::Load => cmd_load(),
        Commands::Forth { input } => cmd_forth(input),
        Commands::Compile { input, output } => cmd_compile(input, output),
        Commands::Repl => cmd_repl(),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "error:".red().bold(), e);
        process::exit(e.exit_code());
    }
}

fn cmd_run() -> Result<()> {
    let stats = Pipeline::new().run(Box::new(io::stdin()), Box::new(io::stdout()))?;
    if !stats.sentinel_seen {
        eprintln!(
            "{} hex stream ended at EOF; {} image bytes sealed, no Forth stage",
            "note:".yellow().bold(),
            stats.image_bytes
        );
    }
    Ok(())
}

fn cmd_load() -> Result<()> {
    // Does not return on success: control transfers into the region.
    Loader::new().run(&mut io::stdin())?;
    Ok(())
}

fn cmd_forth(input: Option<PathBuf>) -> Result<()> {
    let source: Box<dyn Read> = match input {
        Some(path) => Box::new(File::open(path)?),
        None => Box::new(io::stdin()),
    };
    let mut vm = Vm::new(InputStream::new(source), Box::new(io::stdout()));
    vm.boot()?;
    vm.interpret()?;
    Ok(())
}

fn cmd_compile(input: Option<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    let source: Box<dyn Read> = match input {
        Some(path) => Box::new(File::open(path)?),
        None => Box::new(io::stdin()),
    };
    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout()),
    };
    seedc_cc::compile(source, sink)?;
    Ok(())
}

fn cmd_repl() -> Result<()> {
    let mut rl = DefaultEditor::new().map_err(|e| ToolchainError::Io(io::Error::other(e)))?;
    let mut vm = Vm::new(InputStream::from_str(""), Box::new(io::stdout()));
    vm.boot()?;

    println!("seedc forth — type BYE to leave");
    loop {
        match rl.readline("> ") {
            Ok(line) => {
                let _ = rl.add_history_entry(line.as_str());
                match vm.eval_str(&line) {
                    Ok(()) => {
                        if vm.exit_requested() {
                            break;
                        }
                        println!(" ok");
                    }
                    Err(e) => {
                        eprintln!("{} {}", "error:".red().bold(), e);
                        vm.abort();
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(ToolchainError::Io(io::Error::other(e))),
        }
    }
    Ok(())
}
