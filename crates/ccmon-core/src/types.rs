use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

// ─── Terminal ─────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalKind {
    Vscode,
    Iterm,
    Warp,
    Terminal,
    #[default]
    Unknown,
}

impl TerminalKind {
    pub const ALL: [Self; 5] = [
        Self::Vscode,
        Self::Iterm,
        Self::Warp,
        Self::Terminal,
        Self::Unknown,
    ];

    /// Map a raw terminal identifier (as reported by `TERM_PROGRAM`) to a
    /// known terminal. Matching is exact; anything else is `Unknown`.
    pub fn normalize(raw: &str) -> Self {
        match raw {
            "vscode" => Self::Vscode,
            "iTerm.app" | "iTerm" => Self::Iterm,
            "WarpTerminal" | "Warp" => Self::Warp,
            "Apple_Terminal" | "Terminal" => Self::Terminal,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vscode => "vscode",
            Self::Iterm => "iterm",
            Self::Warp => "warp",
            Self::Terminal => "terminal",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TerminalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Status ───────────────────────────────────────────────────────

/// Settable session status. A session that has ended is removed from the
/// registry rather than carrying an `ended` status.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    Thinking,
    Executing,
    WaitingInput,
    Done,
}

impl SessionStatus {
    pub const ALL: [Self; 5] = [
        Self::Idle,
        Self::Thinking,
        Self::Executing,
        Self::WaitingInput,
        Self::Done,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Thinking => "thinking",
            Self::Executing => "executing",
            Self::WaitingInput => "waiting_input",
            Self::Done => "done",
        }
    }

    pub fn is_waiting(self) -> bool {
        self == Self::WaitingInput
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "thinking" => Ok(Self::Thinking),
            "executing" => Ok(Self::Executing),
            "waiting_input" => Ok(Self::WaitingInput),
            "done" => Ok(Self::Done),
            "ended" => Err(CoreError::StatusNotSettable(s.to_owned())),
            _ => Err(CoreError::UnknownStatus(s.to_owned())),
        }
    }
}

// ─── Session ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub pid: u32,
    pub ppid: u32,
    pub terminal: TerminalKind,
    pub cwd: String,
    pub project: String,
    pub status: SessionStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Session {
    /// Move `updated_at` forward to `now`; it never goes backwards.
    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = self.updated_at.max(now);
    }
}

/// Validated input for [`crate::SessionRegistry::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterRequest {
    pub pid: u32,
    pub ppid: u32,
    pub terminal: String,
    pub cwd: String,
}

/// Final non-empty `/`-separated segment of `cwd`, or `"unknown"`.
pub fn project_from_cwd(cwd: &str) -> String {
    cwd.rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or("unknown")
        .to_owned()
}

// ─── Events ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Started,
    Ended,
    Waiting,
    Resumed,
    Killed,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Ended => "ended",
            Self::Waiting => "waiting",
            Self::Resumed => "resumed",
            Self::Killed => "killed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub pid: u32,
    pub project: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ─── Prompts & Tool Calls ─────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPrompt {
    pub id: String,
    pub session_id: u32,
    pub prompt: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    #[default]
    Pending,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub id: String,
    pub session_id: u32,
    pub tool: String,
    pub input: serde_json::Value,
    pub status: ToolStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub completed_at: Option<DateTime<Utc>>,
    /// Milliseconds between `started_at` and `completed_at` on the wire clock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCall {
    pub fn is_pending(&self) -> bool {
        self.status == ToolStatus::Pending
    }

    /// Finish a pending call. `completed_at` is clamped to `started_at` so the
    /// duration is never negative, and is computed from the millisecond values
    /// that get serialized.
    pub(crate) fn complete(&mut self, success: bool, error: Option<String>, now: DateTime<Utc>) {
        let completed_at = now.max(self.started_at);
        self.status = if success {
            ToolStatus::Success
        } else {
            ToolStatus::Error
        };
        self.duration = Some(completed_at.timestamp_millis() - self.started_at.timestamp_millis());
        self.completed_at = Some(completed_at);
        if error.is_some() {
            self.error = error;
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStats {
    pub total_calls: usize,
    pub by_tool: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: Session,
    pub prompt_history: Vec<UserPrompt>,
    pub tool_history: Vec<ToolCall>,
    pub tool_stats: ToolStats,
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).expect("valid timestamp")
    }

    #[test]
    fn terminal_normalize_table() {
        assert_eq!(TerminalKind::normalize("vscode"), TerminalKind::Vscode);
        assert_eq!(TerminalKind::normalize("iTerm.app"), TerminalKind::Iterm);
        assert_eq!(TerminalKind::normalize("iTerm"), TerminalKind::Iterm);
        assert_eq!(TerminalKind::normalize("WarpTerminal"), TerminalKind::Warp);
        assert_eq!(TerminalKind::normalize("Warp"), TerminalKind::Warp);
        assert_eq!(
            TerminalKind::normalize("Apple_Terminal"),
            TerminalKind::Terminal
        );
        assert_eq!(TerminalKind::normalize("Terminal"), TerminalKind::Terminal);
    }

    #[test]
    fn terminal_normalize_is_exact_match() {
        assert_eq!(TerminalKind::normalize("VSCode"), TerminalKind::Unknown);
        assert_eq!(TerminalKind::normalize("kitty"), TerminalKind::Unknown);
        assert_eq!(TerminalKind::normalize(""), TerminalKind::Unknown);
    }

    #[test]
    fn terminal_serde_matches_as_str() {
        for kind in TerminalKind::ALL {
            let json = serde_json::to_string(&kind).expect("serialize");
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn status_from_str_roundtrips_every_variant() {
        for status in SessionStatus::ALL {
            assert_eq!(status.as_str().parse::<SessionStatus>(), Ok(status));
        }
    }

    #[test]
    fn status_ended_is_not_settable() {
        assert_eq!(
            "ended".parse::<SessionStatus>(),
            Err(CoreError::StatusNotSettable("ended".into()))
        );
    }

    #[test]
    fn status_unknown_text_is_rejected() {
        assert_eq!(
            "sleeping".parse::<SessionStatus>(),
            Err(CoreError::UnknownStatus("sleeping".into()))
        );
        assert!("WAITING_INPUT".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn project_is_last_non_empty_segment() {
        assert_eq!(project_from_cwd("/home/me/proj-x"), "proj-x");
        assert_eq!(project_from_cwd("/home/me/proj-x/"), "proj-x");
        assert_eq!(project_from_cwd("relative"), "relative");
        assert_eq!(project_from_cwd("/"), "unknown");
        assert_eq!(project_from_cwd(""), "unknown");
    }

    #[test]
    fn session_wire_format_is_camel_case_with_ms_timestamps() {
        let session = Session {
            pid: 42,
            ppid: 1,
            terminal: TerminalKind::Iterm,
            cwd: "/w/app".into(),
            project: "app".into(),
            status: SessionStatus::WaitingInput,
            started_at: at(1_000),
            updated_at: at(2_500),
            message: None,
        };
        let value = serde_json::to_value(&session).expect("serialize");
        assert_eq!(value["startedAt"], 1_000);
        assert_eq!(value["updatedAt"], 2_500);
        assert_eq!(value["status"], "waiting_input");
        assert_eq!(value["terminal"], "iterm");
        assert!(value.get("message").is_none(), "absent message is omitted");
    }

    #[test]
    fn event_kind_serializes_under_type() {
        let event = SessionEvent {
            id: "7-10-1".into(),
            kind: EventKind::Waiting,
            pid: 7,
            project: "p".into(),
            timestamp: at(10),
            message: Some("approve?".into()),
        };
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["type"], "waiting");
        assert_eq!(value["message"], "approve?");
    }

    #[test]
    fn tool_call_complete_clamps_to_start() {
        let mut call = ToolCall {
            id: "1-tool-5000-1".into(),
            session_id: 1,
            tool: "Bash".into(),
            input: serde_json::json!({}),
            status: ToolStatus::Pending,
            started_at: at(5_000),
            completed_at: None,
            duration: None,
            error: None,
        };
        call.complete(false, Some("boom".into()), at(4_000));
        assert_eq!(call.status, ToolStatus::Error);
        assert_eq!(call.completed_at, Some(at(5_000)));
        assert_eq!(call.duration, Some(0));
        assert_eq!(call.error.as_deref(), Some("boom"));
    }

    #[test]
    fn tool_call_duration_uses_wire_milliseconds() {
        let start = at(1_000) + chrono::Duration::microseconds(900);
        let end = at(1_001) + chrono::Duration::microseconds(100);
        let mut call = ToolCall {
            id: "x".into(),
            session_id: 1,
            tool: "Read".into(),
            input: serde_json::json!({}),
            status: ToolStatus::Pending,
            started_at: start,
            completed_at: None,
            duration: None,
            error: None,
        };
        call.complete(true, None, end);
        let value = serde_json::to_value(&call).expect("serialize");
        let started = value["startedAt"].as_i64().expect("startedAt");
        let completed = value["completedAt"].as_i64().expect("completedAt");
        assert_eq!(value["duration"].as_i64(), Some(completed - started));
    }
}
