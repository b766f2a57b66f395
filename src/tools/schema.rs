//! 工具调用请求格式与 JSON Schema 生成
//!
//! 将「合法 tool call」的 JSON 结构注入 system prompt，减少 LLM 输出格式错误。

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

/// 模型发出的一次工具调用：{"id": "...", "name": "...", "input": {...}}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ToolUseRequest {
    /// 调用 id，由 provider 生成；缺省时为空
    #[serde(default)]
    pub id: String,
    /// 工具名，须为当前可用工具之一
    pub name: String,
    /// 工具参数，依工具不同而不同
    #[serde(default)]
    pub input: serde_json::Value,
}

impl ToolUseRequest {
    pub fn new(name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: format!("toolu_{}", uuid::Uuid::new_v4().simple()),
            name: name.into(),
            input,
        }
    }
}

/// 返回工具调用的 JSON Schema 字符串，可拼入 system prompt
pub fn tool_call_schema_json() -> String {
    let schema = schema_for!(ToolUseRequest);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}
