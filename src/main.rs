// Allow dead code for items that are part of the public API but only used in tests
#![allow(dead_code)]

mod audit;
mod cancel;
mod catalog;
mod cmd;
mod config;
mod emit;
mod error;
mod graph;
mod pipeline;
mod progress;
mod rules;
mod sample;
mod sequence;
mod source;
mod value;
mod writer;

use cancel::CancelToken;
use clap::Parser;
use cmd::Cli;
use error::SampleError;

fn main() {
    let cli = Cli::parse();

    let cancel = CancelToken::new();
    let handler = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler.cancel()) {
        eprintln!("Warning: could not install Ctrl-C handler: {e}");
    }

    if let Err(e) = cmd::run(cli, cancel) {
        match e.downcast_ref::<SampleError>() {
            Some(err) => {
                eprintln!("{}", err.format_detailed());
                std::process::exit(err.exit_code());
            }
            None => {
                eprintln!("Error: {e:#}");
                std::process::exit(1);
            }
        }
    }
}
