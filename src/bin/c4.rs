use c4_lang::config::{scale_pool_size, Options, DEFAULT_POOL_SIZE};
use c4_lang::driver;
use c4_lang::error::FAILURE_STATUS;

use clap::{ArgAction, Parser};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "c4")]
#[command(about = "Compile C4 sources and run them on the bytecode VM")]
struct Cli {
    /// Print each source line with the code emitted for it, then stop
    #[arg(short = 's')]
    source: bool,

    /// Trace every executed instruction
    #[arg(short = 'd')]
    debug: bool,

    /// Dump the symbol table after compiling
    #[arg(short = 'S')]
    symbols: bool,

    /// Halve the memory pool (repeatable)
    #[arg(short = 'p', action = ArgAction::Count)]
    halve: u8,

    /// Double the memory pool (repeatable)
    #[arg(short = 'P', action = ArgAction::Count)]
    double: u8,

    /// Base memory pool size in bytes
    #[arg(long, env = "C4_POOL_SIZE", default_value_t = DEFAULT_POOL_SIZE)]
    pool_size: usize,

    /// Source files, concatenated in order
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Arguments handed to the program after its file name
    #[arg(last = true)]
    args: Vec<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            println!("{}", e);
            process::exit(FAILURE_STATUS);
        }
    };

    let options = Options {
        source: cli.source,
        debug: cli.debug,
        symbols: cli.symbols,
        pool_size: scale_pool_size(cli.pool_size, cli.halve, cli.double),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match driver::run(&options, &cli.files, &cli.args, &mut out) {
        Ok(status) => {
            let _ = out.flush();
            process::exit(status as i32);
        }
        Err(e) => {
            error!("{:?}", e);
            let _ = writeln!(out, "{}", e);
            let _ = out.flush();
            process::exit(FAILURE_STATUS);
        }
    }
}
