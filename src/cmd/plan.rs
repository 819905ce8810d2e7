//! Plan command CLI handler.

use super::{init_logging, RunArgs};
use crate::config::ConfigFile;
use crate::pipeline;
use crate::progress::NoProgress;

pub fn run(args: RunArgs, format: &str) -> anyhow::Result<()> {
    let json = match format {
        "text" => false,
        "json" => true,
        other => anyhow::bail!("unknown format '{}'; expected text or json", other),
    };

    let config = args.resolve(ConfigFile::default())?;
    init_logging(&config)?;

    let report = pipeline::plan(&config, &NoProgress)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report);
    }
    Ok(())
}
