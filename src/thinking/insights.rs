//! 洞察提取与下一步建议
//!
//! 两者都是启发式，只产出文本，从不修改回合状态，也从不失败。

use crate::memory::{Message, Role, ToolCallResult};

pub const TASK_COMPLETED: &str = "Task completed.";
pub const REVIEW_DIRECTIVE: &str =
    "Some tool calls failed. Review the errors and adjust the approach before continuing.";
pub const CONTINUE_DIRECTIVE: &str = "Continue with the next step of the task.";

const FAILED_PREFIX: &str = "Failed tool calls:";

/// 成功数、失败数（>0 时）、用到的工具（按首次出现顺序去重）；输入为空时不产出
pub fn extract_insights(results: &[ToolCallResult]) -> Vec<String> {
    if results.is_empty() {
        return Vec::new();
    }

    let succeeded = results.iter().filter(|r| r.success).count();
    let failed = results.len() - succeeded;
    let mut tools: Vec<&str> = Vec::new();
    for r in results {
        if !tools.contains(&r.tool_name.as_str()) {
            tools.push(&r.tool_name);
        }
    }

    let mut insights = vec![format!("Successful tool calls: {}", succeeded)];
    if failed > 0 {
        insights.push(format!("{} {}", FAILED_PREFIX, failed));
    }
    if !tools.is_empty() {
        insights.push(format!("Tools used: {}", tools.join(", ")));
    }
    insights
}

/// 最后一条 assistant 消息调用过完成工具且该调用成功 → 已完成；有失败洞察 → 复查；否则继续
///
/// 完成调用被拒绝（参数校验、handler 失败或超时）时不算完成，模型需要在下一回合看到错误；
/// 该消息之后出现新的用户消息时也不算。
pub fn next_action_text(
    history: &[Message],
    tool_results: &[ToolCallResult],
    insights: &[String],
    completion_tool: &str,
) -> String {
    // 之后若有新的用户输入，说明已开始新任务
    let invoked = history
        .iter()
        .rev()
        .find(|m| matches!(m.role, Role::Assistant | Role::User))
        .is_some_and(|m| m.role == Role::Assistant && m.invoked(completion_tool));
    let completed = invoked
        && tool_results
            .iter()
            .any(|r| r.tool_name == completion_tool && r.success);
    if completed {
        TASK_COMPLETED.to_string()
    } else if insights.iter().any(|i| i.starts_with(FAILED_PREFIX)) {
        REVIEW_DIRECTIVE.to_string()
    } else {
        CONTINUE_DIRECTIVE.to_string()
    }
}
