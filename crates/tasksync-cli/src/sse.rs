//! Server-sent event encoding
//!
//! `shell --sse` and `sync watch --sse` write the same event stream a web
//! front end would consume: `task_list` events carrying the task array as
//! JSON and `sync_state` events carrying `Sync State: <bool>`.

use std::fmt;

use tasksync_core::Task;

use crate::output::{sync_state_text, tasks_json};

pub const TASK_LIST_EVENT: &str = "task_list";
pub const SYNC_STATE_EVENT: &str = "sync_state";

/// A single server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

impl SseEvent {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }

    /// Snapshot of the task list
    pub fn task_list(tasks: &[Task]) -> Self {
        Self::new(TASK_LIST_EVENT, tasks_json(tasks).to_string())
    }

    /// Observed sync state
    pub fn sync_state(enabled: bool) -> Self {
        Self::new(SYNC_STATE_EVENT, sync_state_text(enabled))
    }

    /// Wire format; each line of data becomes its own `data:` field
    pub fn encode(&self) -> String {
        let mut out = format!("event: {}\n", self.event);
        for line in self.data.split('\n') {
            out.push_str("data: ");
            out.push_str(line.strip_suffix('\r').unwrap_or(line));
            out.push('\n');
        }
        out.push('\n');
        out
    }
}

impl fmt::Display for SseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_state_event() {
        assert_eq!(
            SseEvent::sync_state(true).encode(),
            "event: sync_state\ndata: Sync State: true\n\n"
        );
    }

    #[test]
    fn test_task_list_event() {
        let event = SseEvent::task_list(&[Task::with_id("t1", "Buy milk")]);
        assert_eq!(event.event, TASK_LIST_EVENT);

        let encoded = event.encode();
        assert!(encoded.starts_with("event: task_list\ndata: ["));
        assert!(encoded.ends_with("]\n\n"));
        assert!(encoded.contains(r#""_id":"t1""#));
        assert!(encoded.contains(r#""title":"Buy milk""#));
    }

    #[test]
    fn test_empty_task_list() {
        assert_eq!(
            SseEvent::task_list(&[]).encode(),
            "event: task_list\ndata: []\n\n"
        );
    }

    #[test]
    fn test_multiline_data() {
        let event = SseEvent::new("note", "first\r\nsecond\nthird");
        assert_eq!(
            event.encode(),
            "event: note\ndata: first\ndata: second\ndata: third\n\n"
        );
    }

    #[test]
    fn test_titles_with_newlines_stay_on_one_line() {
        // JSON escapes the newline, so the payload is a single data line
        let event = SseEvent::task_list(&[Task::with_id("t1", "two\nlines")]);
        assert_eq!(event.encode().matches("data: ").count(), 1);
    }
}
