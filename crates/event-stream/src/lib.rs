//! Event Stream - reconnecting server-sent events client
//!
//! Provides:
//! - A line-oriented parser for the `event:`/`id:`/`retry:`/`data:` framing
//! - An [`EventSource`] that reads the stream in a background task and
//!   reconnects forever with `Last-Event-ID` after a drop

pub mod error;
pub mod parser;
pub mod source;

pub use error::{Error, Result};
pub use parser::{Event, Parser, DEFAULT_EVENT_TYPE};
pub use source::{EventSource, EventSourceConfig};
