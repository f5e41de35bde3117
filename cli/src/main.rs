mod boot;
mod dump;
mod extract;

use std::{
    io::{self, Write},
    path::PathBuf,
};

use anyhow::Result;
use boot::Boot;
use clap::{Parser, Subcommand};
use dump::Dump;
use extract::Extract;
use ncch::config::LoaderConfig;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// YAML file with override naming conventions.
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Logs more details, repeat for even more.
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prints the headers of an NCCH container.
    Dump(Dump),
    /// Extracts the ExeFS sections and RomFS of an NCCH container.
    Extract(Extract),
    /// Boots a file and prints the resulting boot state.
    Boot(Boot),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).parse_default_env().init();

    let config = match &cli.config {
        Some(path) => LoaderConfig::from_file(path)?,
        None => LoaderConfig::default(),
    };

    match cli.command {
        Command::Dump(dump) => dump.run(&config),
        Command::Extract(extract) => extract.run(&config),
        Command::Boot(boot) => boot.run(&config),
    }
}

/// Prints `data` as a hex dump with addresses starting at `base_address`, or as raw bytes to stdout.
pub fn print_hex(data: &[u8], raw: bool, base_address: u64) -> Result<()> {
    let mut stdout = io::stdout().lock();
    if raw {
        stdout.write_all(data)?;
        return Ok(());
    }

    for (offset, chunk) in data.chunks(16).enumerate() {
        write!(stdout, "{:08x} ", base_address + offset as u64 * 16)?;
        for byte in chunk {
            write!(stdout, " {byte:02x}")?;
        }
        for _ in chunk.len()..16 {
            write!(stdout, "   ")?;
        }
        let text: String = chunk.iter().map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' }).collect();
        writeln!(stdout, "  {text}")?;
    }
    Ok(())
}
