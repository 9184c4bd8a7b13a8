use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;

/// Disassembles 8086 MOV instructions into NASM syntax
#[derive(Parser, Debug)]
#[command(name = "sim8086", version)]
struct Args {
  /// Assembled 8086 binary to decode
  file: PathBuf,

  /// Enable verbose logging
  #[arg(short, long)]
  verbose: bool,
}

fn main() -> Result<()> {
  let args = match Args::try_parse() {
    Ok(args) => args,
    Err(err) if err.use_stderr() => {
      let _ = err.print();
      std::process::exit(1);
    }
    Err(err) => err.exit(),
  };

  let log_level = if args.verbose { "debug" } else { "warn" };
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
    .format_timestamp_millis()
    .init();

  let path = &args.file;
  let data = std::fs::read(path).with_context(|| format!("Error reading file {}", path.display()))?;
  info!("Decoding {} ({} bytes)", path.display(), data.len());
  if data.is_empty() {
    bail!("{} is empty", path.display());
  }

  let instructions = sim8086::disassemble(&data)
    .with_context(|| format!("Error decoding {}", path.display()))?;
  print!("; src: `{}`\n{instructions}", path.display());
  Ok(())
}
