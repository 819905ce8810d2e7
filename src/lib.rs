// Allow dead code for items that are part of the public API but only used in tests
#![allow(dead_code)]

pub mod audit;
pub mod cancel;
pub mod catalog;
pub mod config;
pub mod emit;
pub mod error;
pub mod graph;
pub mod pipeline;
pub mod progress;
pub mod rules;
pub mod sample;
pub mod sequence;
pub mod source;
pub mod value;
pub mod writer;
