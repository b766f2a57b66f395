//! 回合过程事件：用于流式展示回合、思考、工具调用、观察与结果

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactEvent {
    /// 新回合开始
    TurnStarted { turn_number: u32, max_turns: u32 },
    /// 思考阶段结束
    Thinking {
        rounds: usize,
        compressed: bool,
        next_action: String,
    },
    /// 模型的文本输出
    ThinkingContent { text: String },
    /// 技能切换
    SkillActivated { name: String },
    /// 调用工具
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    Observation {
        tool: String,
        success: bool,
        preview: String,
    },
    /// Token 使用统计（本次调用增量 + 累计）
    TokenUsage {
        prompt_tokens: u64,
        completion_tokens: u64,
        cumulative_total: u64,
    },
    /// 任务移交给其他 agent
    Delegated { agent: String, task: String },
    /// 任务完成
    Completed { result: String },
    /// 错误
    Error { text: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_tag() {
        let ev = ReactEvent::Observation {
            tool: "echo".into(),
            success: true,
            preview: "hi".into(),
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "observation");
        assert_eq!(v["tool"], "echo");
    }
}
