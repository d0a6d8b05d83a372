//! Observer seam between the registry and its consumers (push fan-out,
//! alerts). Listeners run synchronously inside the mutation that caused the
//! change, so they must not block.

use crate::types::{Session, SessionEvent, ToolCall, UserPrompt};

#[derive(Debug, Clone, PartialEq)]
pub enum RegistryChange {
    SessionUpserted(Session),
    SessionRemoved {
        pid: u32,
    },
    EventAppended(SessionEvent),
    PromptAdded {
        pid: u32,
        prompt: UserPrompt,
    },
    ToolStarted {
        pid: u32,
        tool_call: ToolCall,
    },
    ToolEnded {
        pid: u32,
        tool_call_id: String,
        duration_ms: i64,
        success: bool,
    },
}

pub trait ChangeListener: Send + Sync {
    fn on_change(&self, change: &RegistryChange);
}

impl<F> ChangeListener for F
where
    F: Fn(&RegistryChange) + Send + Sync,
{
    fn on_change(&self, change: &RegistryChange) {
        self(change)
    }
}
