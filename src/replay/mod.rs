//! Scripted sessions against a JSON store.
//!
//! A replay script names an initial JSON object and a list of steps
//! (register listeners, open subscriptions, apply patches, flush). Running it
//! produces a [`Transcript`] of every delivery, lifecycle transition and
//! failure, which makes the store's notification order easy to inspect from
//! the command line.

mod error;
mod log_level;
mod runner;
mod script;


pub use error::ReplayError;
pub use log_level::LogLevel;
pub use runner::{Event, Replayer, Transcript};
pub use script::{GeneralConfig, ReplayScript, Step};
