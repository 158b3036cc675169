//! Driver binary: reads a C source file, compiles it, and writes assembly.

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use mcc::compile;

/// Compile a subset of C to x86-64 assembly.
#[derive(Parser, Debug)]
#[command(name = "mcc", version, about)]
struct Cli {
  /// Input file; omit or pass `-` to read from stdin.
  #[arg(default_value = "-")]
  input: PathBuf,

  /// Output file; defaults to stdout.
  #[arg(short, long)]
  output: Option<PathBuf>,

  /// Increase log verbosity; repeatable (-v, -vv, -vvv).
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,
}

fn init_tracing(verbose: u8) {
  use tracing_subscriber::EnvFilter;
  let default_level = match verbose {
    0 => "warn",
    1 => "info",
    2 => "debug",
    _ => "trace",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

fn read_source(path: &PathBuf) -> Result<(Vec<u8>, String)> {
  let (mut bytes, name) = if path.to_str() == Some("-") {
    let mut buf = Vec::new();
    io::stdin().read_to_end(&mut buf).context("reading from stdin")?;
    (buf, "<stdin>".to_string())
  } else {
    let buf = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    (buf, path.display().to_string())
  };
  // The lexer treats `\n\0` as its end-of-buffer sentinel.
  if bytes.last() != Some(&b'\n') {
    bytes.push(b'\n');
  }
  bytes.push(0);
  Ok((bytes, name))
}

fn run() -> Result<ExitCode> {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let (source, filename) = read_source(&cli.input)?;

  let asm = match compile(&source, &filename) {
    Ok(asm) => asm,
    Err(err) => {
      eprint!("{}", err.render(&filename, &source));
      return Ok(ExitCode::FAILURE);
    }
  };

  match cli.output {
    Some(path) => fs::write(&path, asm).with_context(|| format!("writing {}", path.display()))?,
    None => io::stdout().write_all(asm.as_bytes()).context("writing to stdout")?,
  }

  Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
  match run() {
    Ok(code) => code,
    Err(err) => {
      eprintln!("mcc: {err:#}");
      ExitCode::FAILURE
    }
  }
}
