use std::collections::VecDeque;

use crate::types::{ToolCall, ToolStats, UserPrompt};

pub const MAX_PROMPTS_PER_SESSION: usize = 10;
pub const MAX_TOOL_CALLS_PER_SESSION: usize = 50;

/// Recent prompts and tool calls of one session, newest-first.
#[derive(Debug, Default, Clone)]
pub struct SessionHistory {
    prompts: VecDeque<UserPrompt>,
    tool_calls: VecDeque<ToolCall>,
}

impl SessionHistory {
    pub fn push_prompt(&mut self, prompt: UserPrompt) {
        self.prompts.push_front(prompt);
        self.prompts.truncate(MAX_PROMPTS_PER_SESSION);
    }

    /// Record a new call and return the calls that fell out of the window.
    pub fn push_tool_call(&mut self, tool_call: ToolCall) -> Vec<ToolCall> {
        self.tool_calls.push_front(tool_call);
        if self.tool_calls.len() <= MAX_TOOL_CALLS_PER_SESSION {
            return Vec::new();
        }
        self.tool_calls.split_off(MAX_TOOL_CALLS_PER_SESSION).into()
    }

    /// Replace the retained copy of a finished call. No-op once it has been
    /// evicted from the window.
    pub fn update_tool_call(&mut self, tool_call: &ToolCall) {
        if let Some(slot) = self.tool_calls.iter_mut().find(|tc| tc.id == tool_call.id) {
            *slot = tool_call.clone();
        }
    }

    pub fn prompts(&self) -> Vec<UserPrompt> {
        self.prompts.iter().cloned().collect()
    }

    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.tool_calls.iter().cloned().collect()
    }

    pub fn tool_stats(&self) -> ToolStats {
        let mut stats = ToolStats {
            total_calls: self.tool_calls.len(),
            ..ToolStats::default()
        };
        for tool_call in &self.tool_calls {
            *stats.by_tool.entry(tool_call.tool.clone()).or_default() += 1;
        }
        stats
    }
}
