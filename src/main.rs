//! `snapshot-inspect <FILE>...`
//!
//! Prints the header and the object slot table of session snapshots without
//! restoring them. Set `RUST_LOG` to see what the reader is doing.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use session_marshal::marshaller::{inspect, SnapshotSummary};

#[derive(Parser)]
#[command(name = "snapshot-inspect")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Snapshot files to inspect
    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn print_summary(path: &str, summary: &SnapshotSummary) {
    println!("{}", path);
    println!("  version:     {}", summary.header.version);
    println!("  fingerprint: {}", hex(&summary.header.fingerprint));
    println!("  clock:       {}", summary.header.clock);
    println!("  skeleton:    {} bytes", summary.skeleton_len);
    println!("  slots:       {}", summary.slots.len());
    for (number, slot) in summary.slots.iter().enumerate() {
        println!(
            "    #{:<5} entry {:<3} {:>8} bytes  {}",
            number,
            slot.chain_index,
            slot.payload.len(),
            slot.type_tag
        );
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut failed = false;
    for path in &cli.paths {
        let shown = path.display().to_string();
        let summary = File::open(path)
            .map_err(Into::into)
            .and_then(|file| inspect(BufReader::new(file)));
        match summary {
            Ok(summary) => print_summary(&shown, &summary),
            Err(e) => {
                error!(path = shown.as_str(), error = %e, "could not inspect snapshot");
                eprintln!("{}: {}", shown, e);
                failed = true;
            }
        }
    }
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
