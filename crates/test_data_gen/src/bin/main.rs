//! CLI for generating relational fixtures.
//!
//! Usage:
//!   gen-fixtures --scale small --seed 42 > fixture.json

use clap::Parser;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use test_data_gen::{Generator, Scale};

#[derive(Parser, Debug)]
#[command(name = "gen-fixtures")]
#[command(about = "Generate relational JSON fixtures for dbsample", long_about = None)]
struct Args {
    /// Scale preset: small, medium, large
    #[arg(short, long, default_value = "small")]
    scale: String,

    /// Random seed for reproducibility
    #[arg(long, default_value = "12345")]
    seed: u64,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<String>,

    /// Compact JSON instead of pretty-printed
    #[arg(long)]
    compact: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let scale: Scale = args.scale.parse().map_err(|e: String| anyhow::anyhow!(e))?;

    let fixture = Generator::new(args.seed, scale).generate();

    let writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(io::stdout().lock()),
    };
    if args.compact {
        serde_json::to_writer(writer, &fixture)?;
    } else {
        serde_json::to_writer_pretty(writer, &fixture)?;
    }

    if let Some(path) = &args.output {
        eprintln!(
            "Generated {} tables, {} rows, {} foreign keys to {}",
            fixture.tables.len(),
            fixture.row_count(),
            fixture.foreign_key_count(),
            path
        );
    }
    Ok(())
}
