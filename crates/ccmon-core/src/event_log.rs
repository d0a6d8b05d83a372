use chrono::{DateTime, Utc};
use std::collections::VecDeque;

use crate::types::{EventKind, Session, SessionEvent};

pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Bounded, newest-first log of session lifecycle events.
#[derive(Debug)]
pub struct EventLog {
    events: VecDeque<SessionEvent>,
    capacity: usize,
    next_seq: u64,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            next_seq: 0,
        }
    }

    /// Build an event from the session's current fields, prepend it and drop
    /// whatever falls past the capacity.
    pub fn append(&mut self, kind: EventKind, session: &Session, now: DateTime<Utc>) -> SessionEvent {
        self.next_seq += 1;
        let event = SessionEvent {
            id: format!(
                "{}-{}-{}",
                session.pid,
                now.timestamp_millis(),
                self.next_seq
            ),
            kind,
            pid: session.pid,
            project: session.project.clone(),
            timestamp: now,
            message: session.message.clone(),
        };
        self.events.push_front(event.clone());
        self.events.truncate(self.capacity);
        event
    }

    pub fn all(&self) -> Vec<SessionEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
