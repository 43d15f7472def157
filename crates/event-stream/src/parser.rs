//! Server-sent events framing

use std::time::Duration;

/// Type of events that carry no `event:` field
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// A dispatched event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: Option<String>,
    pub kind: String,
    pub data: String,
}

/// Incremental parser fed one line at a time (terminator already stripped)
#[derive(Debug, Default)]
pub struct Parser {
    /// Id of the last dispatched event
    last_event_id: Option<String>,
    /// Id set by the event being accumulated
    id_buffer: Option<String>,
    event_type: String,
    data: String,
    retry: Option<Duration>,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one line; a blank line may complete an event
    pub fn feed_line(&mut self, line: &str) -> Option<Event> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event_type = value.to_string(),
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
            }
            "id" => {
                if !value.contains('\0') {
                    self.id_buffer = Some(value.to_string());
                }
            }
            "retry" => {
                if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(ms) = value.parse::<u64>() {
                        self.retry = Some(Duration::from_millis(ms));
                    }
                }
            }
            other => tracing::trace!("Ignoring event field {:?}", other),
        }
        None
    }

    fn dispatch(&mut self) -> Option<Event> {
        self.last_event_id = self.id_buffer.clone();
        if self.data.is_empty() {
            self.event_type.clear();
            return None;
        }

        let mut data = std::mem::take(&mut self.data);
        if data.ends_with('\n') {
            data.pop();
        }
        let kind = match std::mem::take(&mut self.event_type) {
            kind if kind.is_empty() => DEFAULT_EVENT_TYPE.to_string(),
            kind => kind,
        };
        Some(Event {
            id: self.last_event_id.clone(),
            kind,
            data,
        })
    }

    /// Drop any partially accumulated event, keeping the last dispatched id
    pub fn reset(&mut self) {
        self.id_buffer = self.last_event_id.clone();
        self.event_type.clear();
        self.data.clear();
    }

    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Reconnection delay advised by the server, if any
    pub fn retry(&self) -> Option<Duration> {
        self.retry
    }
}
