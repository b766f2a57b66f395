//! 对话消息
//!
//! 回合内消息按调用顺序保存；assistant 消息可携带它发出的工具调用请求，供「下一步」启发式判断是否已请求完成任务。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tools::ToolUseRequest;

/// 消息角色（与 LLM API 一致，工具结果单独成一类）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    ToolResult,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// 由 TurnMemoryStore 在追加时重新盖章（单调递增）
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_uses: Vec<ToolUseRequest>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            tool_uses: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn tool_result(content: impl Into<String>) -> Self {
        Self::new(Role::ToolResult, content)
    }

    /// assistant 消息附带本轮发出的工具调用
    pub fn with_tool_uses(mut self, tool_uses: Vec<ToolUseRequest>) -> Self {
        self.tool_uses = tool_uses;
        self
    }

    /// 是否调用过指定名称的工具
    pub fn invoked(&self, tool_name: &str) -> bool {
        self.tool_uses.iter().any(|t| t.name == tool_name)
    }
}
