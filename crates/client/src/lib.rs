//! Contest client - game lifecycle and command scheduling
//!
//! This crate ties the transport, block store and event stream together:
//! - Game lifecycle: create, join, resync and leave a game
//! - A single worker executing [`Command`]s one at a time
//! - An idle mailbox coalescing wake-up signals while the worker is busy
//! - The event session demultiplexing server-push payloads per game channel

pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod events;
pub mod mailbox;
pub mod notifier;
pub mod producer;
pub mod snapshot;
mod worker;

#[cfg(test)]
mod tests;

pub use client::{Client, ClientBuilder, Phase, TimeStats};
pub use command::Command;
pub use config::{BotConfig, ClientConfig};
pub use error::{Error, Result};
pub use events::{ClientEvent, GameEvent};
pub use mailbox::Mailbox;
pub use notifier::{Notifier, TracingNotifier};
pub use producer::{CommandEnv, CommandProducer, ShellProducer};
pub use snapshot::{JsonFileSnapshot, SnapshotStore};
