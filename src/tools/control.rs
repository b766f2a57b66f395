//! 流程控制工具：完成任务 / 委派给其他智能体
//!
//! 二者本身不做任何事，只把模型的意图变成可检查的工具调用：
//! 完成工具使 ToolExecutor 截断本批次；委派工具由驱动循环解释为 NextAction::Delegate。

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{ParamSchema, ParamSpec, ParamType, Tool};

pub const COMPLETION_TOOL: &str = "attempt_completion";
pub const DELEGATE_TOOL: &str = "delegate_task";

/// 宣告任务完成，result 为最终答复
pub struct AttemptCompletionTool;

#[async_trait]
impl Tool for AttemptCompletionTool {
    fn name(&self) -> &str {
        COMPLETION_TOOL
    }

    fn description(&self) -> &str {
        "Signal that the task is complete. Args: {\"result\": \"final answer for the user\"}"
    }

    fn parameters_schema(&self) -> ParamSchema {
        ParamSchema::new().field(
            "result",
            ParamSpec::new(ParamType::String)
                .required()
                .describe("final answer presented to the user"),
        )
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        Ok(args
            .get("result")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }
}

/// 把子任务交给另一个智能体
pub struct DelegateTaskTool;

#[async_trait]
impl Tool for DelegateTaskTool {
    fn name(&self) -> &str {
        DELEGATE_TOOL
    }

    fn description(&self) -> &str {
        "Hand the task over to another agent. Args: {\"agent\": \"target agent\", \"task\": \"what it should do\"}"
    }

    fn parameters_schema(&self) -> ParamSchema {
        ParamSchema::new()
            .field(
                "agent",
                ParamSpec::new(ParamType::String).required().length(Some(1), None),
            )
            .field("task", ParamSpec::new(ParamType::String).required())
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let agent = args.get("agent").and_then(|v| v.as_str()).unwrap_or_default();
        Ok(format!("Delegation to {agent} recorded"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_completion_returns_result() {
        let out = AttemptCompletionTool
            .execute(json!({"result": "done"}))
            .await
            .unwrap();
        assert_eq!(out, "done");
    }

    #[test]
    fn test_delegate_requires_agent() {
        let schema = DelegateTaskTool.parameters_schema();
        assert!(schema.validate(&json!({"task": "x"})).is_err());
        assert!(schema.validate(&json!({"agent": "ResearchAgent", "task": "x"})).is_ok());
    }
}
