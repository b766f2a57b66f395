//! 回合记录与状态机
//!
//! pending → thinking → acting → completed，pending / thinking / acting 均可 abort；
//! 只能向前推进（允许跳过中间态），终态之后不可再变。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::Message;

/// 回合状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Pending,
    Thinking,
    Acting,
    Completed,
    Aborted,
}

impl TurnStatus {
    fn rank(self) -> u8 {
        match self {
            TurnStatus::Pending => 0,
            TurnStatus::Thinking => 1,
            TurnStatus::Acting => 2,
            TurnStatus::Completed | TurnStatus::Aborted => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TurnStatus::Completed | TurnStatus::Aborted)
    }

    /// 仅允许向前：非终态可进入任一更靠后的状态
    pub fn can_transition_to(self, next: TurnStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl fmt::Display for TurnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TurnStatus::Pending => "pending",
            TurnStatus::Thinking => "thinking",
            TurnStatus::Acting => "acting",
            TurnStatus::Completed => "completed",
            TurnStatus::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// 一轮思考的产出
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThinkingRound {
    pub round: u32,
    pub content: String,
    pub should_continue: bool,
    pub tokens_used: usize,
}

/// 单次工具调用结果（success=false 表示 handler 失败、超时或参数校验失败）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub tool_name: String,
    pub success: bool,
    pub result: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl ToolCallResult {
    pub fn ok(tool_name: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: true,
            result,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(tool_name: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: false,
            result,
            timestamp: Utc::now(),
        }
    }

    /// 拼回给模型的文本
    pub fn render(&self) -> String {
        let payload = match &self.result {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let tag = if self.success { "ok" } else { "error" };
        format!("[{}:{}] {}", self.tool_name, tag, payload)
    }
}

/// 一个回合：一次请求 / 响应循环
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    pub turn_number: u32,
    pub status: TurnStatus,
    pub workspace_context: String,
    pub task_context: Option<String>,
    pub messages: Vec<Message>,
    pub thinking_rounds: Vec<ThinkingRound>,
    pub tool_results: Vec<ToolCallResult>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub abort_reason: Option<String>,
}

impl Turn {
    pub fn new(turn_number: u32, workspace_context: String, task_context: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            turn_number,
            status: TurnStatus::Pending,
            workspace_context,
            task_context,
            messages: Vec::new(),
            thinking_rounds: Vec::new(),
            tool_results: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
            abort_reason: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        assert!(TurnStatus::Pending.can_transition_to(TurnStatus::Thinking));
        assert!(TurnStatus::Pending.can_transition_to(TurnStatus::Acting));
        assert!(TurnStatus::Thinking.can_transition_to(TurnStatus::Acting));
        assert!(TurnStatus::Acting.can_transition_to(TurnStatus::Completed));
        assert!(TurnStatus::Thinking.can_transition_to(TurnStatus::Aborted));
    }

    #[test]
    fn test_no_backward_or_terminal_exit() {
        assert!(!TurnStatus::Acting.can_transition_to(TurnStatus::Thinking));
        assert!(!TurnStatus::Thinking.can_transition_to(TurnStatus::Thinking));
        assert!(!TurnStatus::Completed.can_transition_to(TurnStatus::Aborted));
        assert!(!TurnStatus::Aborted.can_transition_to(TurnStatus::Completed));
    }

    #[test]
    fn test_render_tool_result() {
        let r = ToolCallResult::ok("echo", serde_json::json!("hi"));
        assert_eq!(r.render(), "[echo:ok] hi");
        let r = ToolCallResult::failed("shell", serde_json::json!({"error": "boom"}));
        assert!(r.render().starts_with("[shell:error]"));
    }
}
