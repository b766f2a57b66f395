//! 工具注册表
//!
//! 工具实现 Tool trait（name / description / parameters_schema / execute），以 ToolRegistration 形式登记，
//! 附带来源（component / skill / global）与启用标记。注册表只保存常驻工具；技能工具由 SkillManager 在激活期间提供。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::ParamSchema;

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 参数 schema，默认无参数
    fn parameters_schema(&self) -> ParamSchema {
        ParamSchema::new()
    }

    /// 无副作用的工具可与相邻的同类工具并发执行
    fn is_side_effect_free(&self) -> bool {
        false
    }

    async fn execute(&self, args: Value) -> Result<String, String>;
}

/// 工具来源
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolSource {
    Component,
    Skill,
    Global,
}

/// 暴露给模型的工具定义
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: ParamSchema,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: ParamSchema::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: ParamSchema) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "parameters": self.parameters.to_json_schema(),
        })
    }
}

/// 一条注册记录；handler 为空时由 Workspace.handle_tool_call 处理
#[derive(Clone)]
pub struct ToolRegistration {
    pub definition: ToolDefinition,
    pub source: ToolSource,
    pub enabled: bool,
    pub handler: Option<Arc<dyn Tool>>,
}

impl fmt::Debug for ToolRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistration")
            .field("name", &self.definition.name)
            .field("source", &self.source)
            .field("enabled", &self.enabled)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

impl PartialEq for ToolRegistration {
    fn eq(&self, other: &Self) -> bool {
        self.definition == other.definition
            && self.source == other.source
            && self.enabled == other.enabled
            && self.handler.is_some() == other.handler.is_some()
    }
}

impl ToolRegistration {
    pub fn from_tool(tool: Arc<dyn Tool>, source: ToolSource) -> Self {
        let definition = ToolDefinition::new(tool.name(), tool.description())
            .with_parameters(tool.parameters_schema());
        Self {
            definition,
            source,
            enabled: true,
            handler: Some(tool),
        }
    }

    pub fn from_definition(definition: ToolDefinition, source: ToolSource) -> Self {
        Self {
            definition,
            source,
            enabled: true,
            handler: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn is_side_effect_free(&self) -> bool {
        self.handler
            .as_ref()
            .map(|h| h.is_side_effect_free())
            .unwrap_or(false)
    }
}

/// 常驻工具注册表：按名称存储，可跨会话只读共享
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolRegistration>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册组件工具
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_with_source(Arc::new(tool), ToolSource::Component);
    }

    pub fn register_global(&mut self, tool: impl Tool + 'static) {
        self.register_with_source(Arc::new(tool), ToolSource::Global);
    }

    pub fn register_with_source(&mut self, tool: Arc<dyn Tool>, source: ToolSource) {
        self.insert(ToolRegistration::from_tool(tool, source));
    }

    pub fn insert(&mut self, registration: ToolRegistration) {
        if registration.source == ToolSource::Skill {
            tracing::warn!(
                tool = %registration.name(),
                "skill-scoped tool registered as always-available; it will be ignored until moved to a skill"
            );
        }
        let name = registration.name().to_string();
        if self.tools.insert(name.clone(), registration).is_some() {
            tracing::warn!(tool = %name, "tool re-registered, previous definition replaced");
        }
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.tools.get_mut(name) {
            Some(reg) => {
                reg.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&ToolRegistration> {
        self.tools.get(name)
    }

    /// 常驻可用工具：已启用的 component / global 工具，按名称排序
    pub fn always_available(&self) -> Vec<ToolRegistration> {
        let mut tools: Vec<ToolRegistration> = self
            .tools
            .values()
            .filter(|t| t.enabled && t.source != ToolSource::Skill)
            .cloned()
            .collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 返回 (name, description) 列表，用于生成 prompt 中的 Available tools 段落
    pub fn tool_descriptions(&self) -> Vec<(String, String)> {
        self.always_available()
            .into_iter()
            .map(|t| (t.definition.name, t.definition.description))
            .collect()
    }

    /// 常驻工具的 schema JSON
    pub fn to_schema_json(&self) -> String {
        let tools: Vec<Value> = self
            .always_available()
            .iter()
            .map(|t| t.definition.to_json())
            .collect();
        serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::EchoTool;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let reg = registry.get("echo").unwrap();
        assert_eq!(reg.source, ToolSource::Component);
        assert!(reg.handler.is_some());
        assert_eq!(registry.tool_names(), vec!["echo".to_string()]);
    }

    #[test]
    fn test_disabled_and_skill_tools_not_available() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.insert(ToolRegistration::from_definition(
            ToolDefinition::new("search_pubmed", "skill tool"),
            ToolSource::Skill,
        ));
        registry.insert(ToolRegistration::from_definition(
            ToolDefinition::new("render_page", "global tool"),
            ToolSource::Global,
        ));
        assert!(registry.set_enabled("echo", false));
        assert!(!registry.set_enabled("missing", false));

        let names: Vec<_> = registry
            .always_available()
            .into_iter()
            .map(|t| t.definition.name)
            .collect();
        assert_eq!(names, vec!["render_page"]);
    }

    #[test]
    fn test_schema_json() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let json = registry.to_schema_json();
        assert!(json.contains("\"echo\""));
        assert!(json.contains("\"text\""));
    }
}
