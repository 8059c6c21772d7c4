//! Background pipeline.
//!
//! One long-lived task repeats: read the crawl offset, crawl a batch,
//! dispatch accepted items, sweep conversions, sleep with jitter.

mod runner;
mod types;

pub use runner::{jittered_delay, PipelineRunner};
pub use types::*;
