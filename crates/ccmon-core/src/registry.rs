//! Session registry: the single owner of tracked sessions, the event log and
//! per-session prompt/tool history.
//!
//! Single-threaded and deterministic. Callers serialize access (the daemon
//! wraps it in a mutex) and pass `now` into every mutation. After each
//! successful mutation the registered [`ChangeListener`]s are invoked in
//! registration order.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::change::{ChangeListener, RegistryChange};
use crate::event_log::EventLog;
use crate::history::SessionHistory;
use crate::types::{
    EventKind, RegisterRequest, Session, SessionDetail, SessionEvent, SessionStatus, TerminalKind,
    ToolCall, ToolStats, ToolStatus, UserPrompt, project_from_cwd,
};

pub struct SessionRegistry {
    sessions: HashMap<u32, Session>,
    events: EventLog,
    histories: HashMap<u32, SessionHistory>,
    /// Tool calls that have started but not ended, keyed by tool call id.
    pending_tools: HashMap<String, ToolCall>,
    listeners: Vec<Arc<dyn ChangeListener>>,
    /// Sequence for prompt and tool call ids.
    next_seq: u64,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.len())
            .field("events", &self.events.len())
            .field("pending_tools", &self.pending_tools.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::with_event_log(EventLog::new())
    }

    pub fn with_event_log(events: EventLog) -> Self {
        Self {
            sessions: HashMap::new(),
            events,
            histories: HashMap::new(),
            pending_tools: HashMap::new(),
            listeners: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn add_listener(&mut self, listener: Arc<dyn ChangeListener>) {
        self.listeners.push(listener);
    }

    // ─── Sessions ─────────────────────────────────────────────────

    /// Insert or overwrite the session for `req.pid`. The previous record
    /// and its prompt/tool history do not survive.
    pub fn register(&mut self, req: RegisterRequest, now: DateTime<Utc>) -> Session {
        let session = Session {
            pid: req.pid,
            ppid: req.ppid,
            terminal: TerminalKind::normalize(&req.terminal),
            project: project_from_cwd(&req.cwd),
            cwd: req.cwd,
            status: SessionStatus::Idle,
            started_at: now,
            updated_at: now,
            message: None,
        };
        self.forget_history(session.pid);
        self.sessions.insert(session.pid, session.clone());
        self.notify(RegistryChange::SessionUpserted(session.clone()));
        self.record_event(EventKind::Started, &session, now);
        session
    }

    pub fn get(&self, pid: u32) -> Option<&Session> {
        self.sessions.get(&pid)
    }

    /// All sessions, sorted by pid.
    pub fn all(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.sessions.values().cloned().collect();
        sessions.sort_by_key(|s| s.pid);
        sessions
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Set the status (and message, when given). Emits `waiting` on entering
    /// `waiting_input` and `resumed` on leaving it; repeated waiting is silent.
    pub fn update_status(
        &mut self,
        pid: u32,
        status: SessionStatus,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> Option<Session> {
        let session = self.sessions.get_mut(&pid)?;
        let previous = session.status;
        session.status = status;
        session.touch(now);
        if message.is_some() {
            session.message = message;
        }
        let session = session.clone();

        self.notify(RegistryChange::SessionUpserted(session.clone()));
        match (previous.is_waiting(), status.is_waiting()) {
            (false, true) => self.record_event(EventKind::Waiting, &session, now),
            (true, false) => self.record_event(EventKind::Resumed, &session, now),
            _ => {}
        }
        Some(session)
    }

    /// Remove a session that ended normally. Returns `false` for an unknown pid.
    pub fn delete(&mut self, pid: u32, now: DateTime<Utc>) -> bool {
        self.remove(pid, EventKind::Ended, now)
    }

    /// Remove a session on behalf of a dashboard kill request.
    pub fn kill(&mut self, pid: u32, now: DateTime<Utc>) -> bool {
        self.remove(pid, EventKind::Killed, now)
    }

    fn remove(&mut self, pid: u32, kind: EventKind, now: DateTime<Utc>) -> bool {
        let Some(session) = self.sessions.remove(&pid) else {
            return false;
        };
        self.record_event(kind, &session, now);
        self.forget_history(pid);
        self.notify(RegistryChange::SessionRemoved { pid });
        true
    }

    // ─── Events ───────────────────────────────────────────────────

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.all()
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    // ─── Prompts & Tool Calls ─────────────────────────────────────

    pub fn add_prompt(&mut self, pid: u32, text: String, now: DateTime<Utc>) -> Option<UserPrompt> {
        let session = self.touch_session(pid, now)?;
        let prompt = UserPrompt {
            id: self.next_id(pid, "prompt", now),
            session_id: pid,
            prompt: text,
            timestamp: now,
        };
        self.histories
            .entry(pid)
            .or_default()
            .push_prompt(prompt.clone());

        self.notify(RegistryChange::SessionUpserted(session));
        self.notify(RegistryChange::PromptAdded {
            pid,
            prompt: prompt.clone(),
        });
        Some(prompt)
    }

    pub fn prompts(&self, pid: u32) -> Option<Vec<UserPrompt>> {
        self.history(pid).map(|h| h.prompts())
    }

    pub fn start_tool_call(
        &mut self,
        pid: u32,
        tool: String,
        input: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Option<ToolCall> {
        let session = self.touch_session(pid, now)?;
        let tool_call = ToolCall {
            id: self.next_id(pid, "tool", now),
            session_id: pid,
            tool,
            input,
            status: ToolStatus::Pending,
            started_at: now,
            completed_at: None,
            duration: None,
            error: None,
        };
        self.pending_tools
            .insert(tool_call.id.clone(), tool_call.clone());
        let evicted = self
            .histories
            .entry(pid)
            .or_default()
            .push_tool_call(tool_call.clone());
        for old in &evicted {
            self.pending_tools.remove(&old.id);
        }

        self.notify(RegistryChange::SessionUpserted(session));
        self.notify(RegistryChange::ToolStarted {
            pid,
            tool_call: tool_call.clone(),
        });
        Some(tool_call)
    }

    /// Complete a pending tool call. `None` when the id is unknown, already
    /// ended, or belongs to another session.
    pub fn end_tool_call(
        &mut self,
        pid: u32,
        tool_call_id: &str,
        success: bool,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Option<ToolCall> {
        if self
            .pending_tools
            .get(tool_call_id)
            .is_none_or(|tc| tc.session_id != pid)
        {
            return None;
        }
        let mut tool_call = self.pending_tools.remove(tool_call_id)?;
        tool_call.complete(success, error, now);
        if let Some(history) = self.histories.get_mut(&pid) {
            history.update_tool_call(&tool_call);
        }

        self.notify(RegistryChange::ToolEnded {
            pid,
            tool_call_id: tool_call.id.clone(),
            duration_ms: tool_call.duration.unwrap_or_default(),
            success,
        });
        Some(tool_call)
    }

    pub fn tool_calls(&self, pid: u32) -> Option<Vec<ToolCall>> {
        self.history(pid).map(|h| h.tool_calls())
    }

    pub fn tool_stats(&self, pid: u32) -> Option<ToolStats> {
        self.history(pid).map(|h| h.tool_stats())
    }

    pub fn detail(&self, pid: u32) -> Option<SessionDetail> {
        let session = self.sessions.get(&pid)?.clone();
        let history = self.histories.get(&pid).cloned().unwrap_or_default();
        Some(SessionDetail {
            session,
            prompt_history: history.prompts(),
            tool_history: history.tool_calls(),
            tool_stats: history.tool_stats(),
        })
    }

    // ─── Internals ────────────────────────────────────────────────

    /// History of a tracked session; empty history for a session that has
    /// none yet, `None` for an unknown pid.
    fn history(&self, pid: u32) -> Option<SessionHistory> {
        if !self.sessions.contains_key(&pid) {
            return None;
        }
        Some(self.histories.get(&pid).cloned().unwrap_or_default())
    }

    fn touch_session(&mut self, pid: u32, now: DateTime<Utc>) -> Option<Session> {
        let session = self.sessions.get_mut(&pid)?;
        session.touch(now);
        Some(session.clone())
    }

    fn forget_history(&mut self, pid: u32) {
        self.histories.remove(&pid);
        self.pending_tools.retain(|_, tc| tc.session_id != pid);
    }

    fn next_id(&mut self, pid: u32, kind: &str, now: DateTime<Utc>) -> String {
        self.next_seq += 1;
        format!(
            "{pid}-{kind}-{}-{}",
            now.timestamp_millis(),
            self.next_seq
        )
    }

    fn record_event(&mut self, kind: EventKind, session: &Session, now: DateTime<Utc>) {
        let event = self.events.append(kind, session, now);
        self.notify(RegistryChange::EventAppended(event));
    }

    fn notify(&self, change: RegistryChange) {
        for listener in &self.listeners {
            listener.on_change(&change);
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────
