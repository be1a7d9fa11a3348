use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context as _;
use avcbasic::error::Position;
use avcbasic::{CompileError, Context, parser, tokenizer};
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Compile a BASIC program into assembly for the AVC stack machine.
#[derive(Debug, Parser)]
#[command(name = "avcbasic", version)]
struct Cli {
  /// Program to compile.
  input: PathBuf,

  /// Where to write the result. Defaults to the input path with `.avc` appended.
  #[arg(short, long)]
  output: Option<PathBuf>,

  /// Print the result instead of writing a file.
  #[arg(long, conflicts_with = "output")]
  stdout: bool,

  /// Stage whose output is produced.
  #[arg(long, value_enum, default_value_t = Emit::Asm)]
  emit: Emit,

  /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` overrides it.
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
  Asm,
  Tokens,
  Ast,
}

fn init_logging(verbose: u8) {
  let default = match verbose {
    0 => "warn",
    1 => "debug",
    _ => "trace",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(false)
    .with_writer(std::io::stderr)
    .init();
}

fn default_output(input: &Path) -> PathBuf {
  let mut name = OsString::from(input.as_os_str());
  name.push(".avc");
  PathBuf::from(name)
}

fn render(source: &str, emit: Emit) -> avcbasic::CompileResult<String> {
  match emit {
    Emit::Asm => avcbasic::compile(source, &mut Context::new()),
    Emit::Tokens => {
      let tokens = tokenizer::tokenize(source)?;
      Ok(
        tokens
          .iter()
          .map(|token| format!("{:>5} {:?}\n", token.loc, token.kind))
          .collect(),
      )
    }
    Emit::Ast => {
      let tokens = tokenizer::tokenize(source)?;
      let program = parser::parse(tokens, source)?.fold(&mut Context::new())?;
      Ok(format!("{program:#?}\n"))
    }
  }
}

/// Where in the source a failed compilation went wrong, when it is known.
fn diagnostic_position(err: &anyhow::Error) -> Option<&Position> {
  err
    .downcast_ref::<CompileError>()
    .and_then(CompileError::position)
}

fn run(cli: &Cli) -> anyhow::Result<()> {
  let source = fs::read_to_string(&cli.input)
    .with_context(|| format!("reading {}", cli.input.display()))?;

  let text = render(&source, cli.emit)
    .with_context(|| format!("compiling {}", cli.input.display()))?;

  if cli.stdout {
    print!("{text}");
    return Ok(());
  }

  let output = cli
    .output
    .clone()
    .unwrap_or_else(|| default_output(&cli.input));
  fs::write(&output, text).with_context(|| format!("writing {}", output.display()))?;
  info!(output = %output.display(), "wrote assembly");
  Ok(())
}

fn main() {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  if let Err(err) = run(&cli) {
    match diagnostic_position(&err) {
      Some(position) => error!(
        line = position.line,
        column = position.column,
        "compilation failed"
      ),
      None => error!("compilation failed"),
    }
    eprintln!("{err:#}");
    process::exit(1);
  }
}
