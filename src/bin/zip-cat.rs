//! Stream one entry of a zip archive to stdout, prefixed by a frame line.
//!
//! Exit status is 0 on success, 2 when the archive or entry is missing and
//! 1 for any other failure.

use std::io::{self, BufWriter};
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;

use accel_proxy::archive::cat_entry;

const PROG_NAME: &str = "zip-cat";

#[derive(Parser)]
#[command(name = PROG_NAME, version)]
#[command(about = "Stream a single zip entry to stdout", long_about = None)]
struct Cli {
    /// Archive path or http(s) URL.
    archive: String,

    /// Exact entry name inside the archive.
    entry: String,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayVersion | ErrorKind::DisplayHelp) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(_) => {
            eprintln!("Usage: {PROG_NAME} FILE.ZIP ENTRY");
            return ExitCode::from(1);
        }
    };

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    match cat_entry(&cli.archive, &cli.entry, &mut out) {
        Ok(bytes) => {
            tracing::debug!(archive = %cli.archive, entry = %cli.entry, bytes, "Entry written");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{PROG_NAME}: {e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
