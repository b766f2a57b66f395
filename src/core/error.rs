//! Agent 错误类型
//!
//! 不变量破坏（重复开回合、完成非当前回合）、未找到（工具 / 上下文）、外部调用失败统一为 AgentError。
//! 技能激活失败不属于错误：SkillManager 以 SkillActivation 值返回，便于模型换名重试。

use thiserror::Error;

use crate::llm::LlmError;
use crate::memory::TurnStatus;

/// 回合编排过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Turn {turn_number} is still {status}; complete or abort it before starting a new turn")]
    TurnAlreadyActive { turn_number: u32, status: TurnStatus },

    #[error("No active turn")]
    NoActiveTurn,

    #[error("Turn {requested} is not the current turn (current: {current})")]
    TurnMismatch { requested: String, current: String },

    #[error("Invalid turn transition: {from} -> {to}")]
    InvalidTransition { from: TurnStatus, to: TurnStatus },

    #[error("Turn {0} is closed")]
    TurnClosed(u32),

    /// 批次中出现未注册的工具名：整批失败，消息列出可用工具供调用方自行纠正
    #[error("Tool not found: {name}. Available tools: {}", format_names(.available))]
    ToolNotFound { name: String, available: Vec<String> },

    #[error("Context not found: {0}")]
    ContextNotFound(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("LLM error: {0}")]
    LlmError(#[from] LlmError),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Cancelled")]
    Cancelled,
}

fn format_names(names: &[String]) -> String {
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(", ")
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::Persistence(e.to_string())
    }
}
