//! 回合存储：会话内的规范对话状态
//!
//! 同一时刻至多一个非终态回合；回合号从 1 开始连续递增；消息时间戳严格单调。
//! 底层持有本会话的 ContextMemoryStore（快照 / 摘要）。

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::memory::{
    ContextMemoryExport, ContextMemoryStore, Message, ThinkingRound, ToolCallResult, Turn,
    TurnStatus,
};

/// 会话完整导出：回合序列 + 上下文存储 + 工具用量
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionExport {
    pub session_id: String,
    pub turns: Vec<Turn>,
    pub context: ContextMemoryExport,
    /// 按工具名累计的派发次数；参数校验失败等未派发的调用不计入，无法从 turns 反推
    #[serde(default)]
    pub tool_usage: HashMap<String, u32>,
}

#[derive(Debug)]
pub struct TurnMemoryStore {
    session_id: String,
    turns: Vec<Turn>,
    context: ContextMemoryStore,
    last_timestamp: Option<DateTime<Utc>>,
}

impl TurnMemoryStore {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            turns: Vec::new(),
            context: ContextMemoryStore::new(),
            last_timestamp: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// 开启新回合；已有非终态回合时失败
    pub fn start_turn(
        &mut self,
        workspace_context: impl Into<String>,
        task_context: Option<String>,
    ) -> Result<Turn, AgentError> {
        if let Some(open) = self.current_turn() {
            return Err(AgentError::TurnAlreadyActive {
                turn_number: open.turn_number,
                status: open.status,
            });
        }
        let turn_number = self.turns.last().map(|t| t.turn_number + 1).unwrap_or(1);
        let turn = Turn::new(turn_number, workspace_context.into(), task_context);
        tracing::info!(session = %self.session_id, turn = turn_number, "turn started");
        self.turns.push(turn.clone());
        Ok(turn)
    }

    /// 追加消息到当前回合，并盖上单调递增的时间戳
    pub fn add_message(&mut self, mut message: Message) -> Result<Message, AgentError> {
        message.timestamp = self.next_timestamp();
        let turn = self.current_turn_mut()?;
        turn.messages.push(message.clone());
        Ok(message)
    }

    pub fn begin_thinking(&mut self) -> Result<(), AgentError> {
        self.transition_current(TurnStatus::Thinking)
    }

    pub fn begin_acting(&mut self) -> Result<(), AgentError> {
        self.transition_current(TurnStatus::Acting)
    }

    pub fn record_thinking_rounds(&mut self, rounds: Vec<ThinkingRound>) -> Result<(), AgentError> {
        self.current_turn_mut()?.thinking_rounds.extend(rounds);
        Ok(())
    }

    pub fn record_tool_results(&mut self, results: Vec<ToolCallResult>) -> Result<(), AgentError> {
        self.current_turn_mut()?.tool_results.extend(results);
        Ok(())
    }

    /// 完成回合。
    ///
    /// 若 turn_id 是最近一个回合且已处于终态，仅记录警告；若 turn_id 指向其他回合（旧回合或未知 id），
    /// 属于调用方编程错误，返回 TurnMismatch。
    pub fn complete_turn(&mut self, turn_id: &str) -> Result<(), AgentError> {
        self.close_turn(turn_id, TurnStatus::Completed, None)
    }

    pub fn abort_turn(&mut self, turn_id: &str, reason: impl Into<String>) -> Result<(), AgentError> {
        self.close_turn(turn_id, TurnStatus::Aborted, Some(reason.into()))
    }

    fn close_turn(
        &mut self,
        turn_id: &str,
        status: TurnStatus,
        reason: Option<String>,
    ) -> Result<(), AgentError> {
        let session_id = self.session_id.clone();
        let last = self.turns.last().ok_or(AgentError::NoActiveTurn)?;
        if last.id != turn_id {
            return Err(AgentError::TurnMismatch {
                requested: turn_id.to_string(),
                current: last.id.clone(),
            });
        }
        if last.is_terminal() {
            tracing::warn!(
                session = %session_id,
                turn = last.turn_number,
                status = %last.status,
                "turn already closed, ignoring"
            );
            return Ok(());
        }

        // 校验通过后才推进时钟
        let ended_at = self.next_timestamp();
        let last = self.turns.last_mut().ok_or(AgentError::NoActiveTurn)?;
        last.status = status;
        last.ended_at = Some(ended_at);
        last.abort_reason = reason;
        tracing::info!(session = %session_id, turn = last.turn_number, status = %status, "turn closed");
        Ok(())
    }

    fn transition_current(&mut self, next: TurnStatus) -> Result<(), AgentError> {
        let turn = self.current_turn_mut()?;
        if !turn.status.can_transition_to(next) {
            return Err(AgentError::InvalidTransition {
                from: turn.status,
                to: next,
            });
        }
        tracing::debug!(turn = turn.turn_number, from = %turn.status, to = %next, "turn transition");
        turn.status = next;
        Ok(())
    }

    /// 所有回合的消息按回合号顺序拼接
    pub fn get_all_messages(&self) -> Vec<Message> {
        self.turns
            .iter()
            .flat_map(|t| t.messages.iter().cloned())
            .collect()
    }

    /// 当前非终态回合
    pub fn current_turn(&self) -> Option<&Turn> {
        self.turns.last().filter(|t| !t.is_terminal())
    }

    fn current_turn_mut(&mut self) -> Result<&mut Turn, AgentError> {
        match self.turns.last_mut() {
            Some(t) if !t.is_terminal() => Ok(t),
            Some(t) => Err(AgentError::TurnClosed(t.turn_number)),
            None => Err(AgentError::NoActiveTurn),
        }
    }

    pub fn get_turn(&self, turn_number: u32) -> Option<&Turn> {
        self.turns.iter().find(|t| t.turn_number == turn_number)
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn context(&self) -> &ContextMemoryStore {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut ContextMemoryStore {
        &mut self.context
    }

    pub fn export(&self) -> SessionExport {
        SessionExport {
            session_id: self.session_id.clone(),
            turns: self.turns.clone(),
            context: self.context.export(),
            tool_usage: HashMap::new(),
        }
    }

    /// 从导出恢复会话（先清空再加载）
    pub fn import(&mut self, blob: SessionExport) {
        self.session_id = blob.session_id;
        self.last_timestamp = blob
            .turns
            .iter()
            .flat_map(|t| t.messages.iter().map(|m| m.timestamp).chain(t.ended_at))
            .max();
        self.turns = blob.turns;
        self.context.import(blob.context);
    }

    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(ts);
        ts
    }
}
