//! CLI entrypoint for the nativepoll platform probe.

use std::io::Write;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use nativepoll_core::Config;
use nativepoll_harness::{ProbeError, catalog_entries, errno_entry, info_json, write_jsonl};

/// Inspect what nativepoll sees on this host.
#[derive(Debug, Parser)]
#[command(name = "nativepoll-probe")]
#[command(about = "Host facts and errno catalog as seen by nativepoll")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the bootstrapped platform facts as JSON.
    Info,
    /// Print the catalog entry for one errno.
    Errno {
        /// Positive errno value.
        code: i32,
    },
    /// Dump the errno catalog as JSONL.
    Catalog {
        /// Only the first N entries.
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn run(cli: Cli) -> Result<(), ProbeError> {
    let platform = nativepoll_sys::platform(&Config::from_env())?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match cli.command {
        Command::Info => {
            writeln!(out, "{}", info_json(&platform)?)?;
        }
        Command::Errno { code } => {
            let entry = errno_entry(&platform, code)?;
            writeln!(out, "{}", serde_json::to_string(&entry)?)?;
        }
        Command::Catalog { limit } => {
            write_jsonl(&catalog_entries(&platform, limit), &mut out)?;
        }
    }
    platform.flush_log()?;
    Ok(())
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("nativepoll-probe: {err}");
            ExitCode::FAILURE
        }
    }
}
