//! Sample command CLI handler.

use super::{init_logging, RunArgs};
use crate::cancel::CancelToken;
use crate::config::ConfigFile;
use crate::pipeline;
use crate::progress::{NoProgress, ProgressSink, SpinnerProgress};
use std::path::PathBuf;
use std::time::Instant;

#[allow(clippy::too_many_arguments)]
pub fn run(
    args: RunArgs,
    file: Option<PathBuf>,
    compress: bool,
    encoding: Option<String>,
    data_only: bool,
    target_version: Option<String>,
    verify: bool,
    dry_run: bool,
    audit_file: Option<PathBuf>,
    cancel: CancelToken,
) -> anyhow::Result<()> {
    let extra = ConfigFile {
        file,
        compress: compress.then_some(true),
        encoding,
        data_only: data_only.then_some(true),
        target_version,
        verify: verify.then_some(true),
        dry_run: dry_run.then_some(true),
        audit_file,
        ..ConfigFile::default()
    };
    let config = args.resolve(extra)?;
    init_logging(&config)?;

    let progress: Box<dyn ProgressSink> = if config.progress {
        Box::new(SpinnerProgress::new())
    } else {
        Box::new(NoProgress)
    };

    if config.dry_run {
        let report = pipeline::plan(&config, progress.as_ref())?;
        print!("{}", report);
        return Ok(());
    }

    let start_time = Instant::now();
    let summary = pipeline::run(&config, &cancel, progress.as_ref())?;
    let elapsed = start_time.elapsed();

    if config.progress || config.output.is_some() {
        eprintln!();
        eprintln!("Sample Statistics:");
        eprintln!("  Strategy: {}", summary.strategy);
        eprintln!("  Tables written: {}", summary.tables);
        eprintln!("  Rows written: {}", summary.rows);
        eprintln!("  Statements: {}", summary.statements);
        eprintln!("  Sequences set: {}", summary.sequences);
        eprintln!("  Elapsed: {:.3?}", elapsed);
        if let Some(path) = &config.output {
            eprintln!("  Output: {}", path.display());
        }

        if !summary.warnings.is_empty() {
            eprintln!();
            for warning in &summary.warnings {
                eprintln!("  Warning: {}", warning);
            }
        }
    }

    Ok(())
}
