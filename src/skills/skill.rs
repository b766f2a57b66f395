//! 技能定义
//!
//! 技能是一组提示词增强（capability / direction）与可选工具集；激活期间其工具对模型可见。

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::tools::{ToolDefinition, ToolRegistration, ToolSource};

/// 激活 / 停用钩子；返回 Err 时由 SkillManager 上报给调用方
#[async_trait]
pub trait SkillHooks: Send + Sync {
    async fn on_activate(&self) -> Result<(), String> {
        Ok(())
    }

    async fn on_deactivate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// 技能的提示词片段
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SkillPrompt {
    pub capability: String,
    pub direction: String,
}

#[derive(Clone)]
pub struct Skill {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub triggers: Vec<String>,
    pub prompt: SkillPrompt,
    pub tools: Vec<ToolRegistration>,
    pub hooks: Option<Arc<dyn SkillHooks>>,
}

impl fmt::Debug for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Skill")
            .field("name", &self.name)
            .field("display_name", &self.display_name)
            .field("triggers", &self.triggers)
            .field("tools", &self.tool_names())
            .field("has_hooks", &self.hooks.is_some())
            .finish()
    }
}

impl Skill {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            description: description.into(),
            triggers: Vec::new(),
            prompt: SkillPrompt::default(),
            tools: Vec::new(),
            hooks: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_triggers(mut self, triggers: Vec<String>) -> Self {
        self.triggers = triggers;
        self
    }

    pub fn with_prompt(mut self, capability: impl Into<String>, direction: impl Into<String>) -> Self {
        self.prompt = SkillPrompt {
            capability: capability.into(),
            direction: direction.into(),
        };
        self
    }

    /// 添加技能工具；来源统一标记为 Skill
    pub fn with_tool(mut self, mut tool: ToolRegistration) -> Self {
        tool.source = ToolSource::Skill;
        self.tools.push(tool);
        self
    }

    pub fn with_tool_definition(self, definition: ToolDefinition) -> Self {
        self.with_tool(ToolRegistration::from_definition(definition, ToolSource::Skill))
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn SkillHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    /// 用于 LLM 选择的简短描述
    pub fn summary(&self) -> String {
        format!("[{}] {}: {}", self.name, self.display_name, self.description)
    }

    /// 激活后拼入 system prompt 的段落
    pub fn prompt_section(&self) -> String {
        let mut s = format!("## Active skill: {}\n", self.display_name);
        if !self.prompt.capability.trim().is_empty() {
            s.push_str(&format!("\n### Capability\n{}\n", self.prompt.capability.trim()));
        }
        if !self.prompt.direction.trim().is_empty() {
            s.push_str(&format!("\n### Direction\n{}\n", self.prompt.direction.trim()));
        }
        s
    }

    /// 触发词是否出现在文本中（大小写不敏感）
    pub fn is_triggered_by(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.triggers
            .iter()
            .filter(|t| !t.trim().is_empty())
            .any(|t| text.contains(&t.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn research() -> Skill {
        Skill::new("ResearchAgent", "Literature search")
            .with_display_name("Research")
            .with_triggers(vec!["PubMed".into(), "literature".into()])
            .with_prompt("Search and cite papers.", "Prefer systematic reviews.")
            .with_tool_definition(ToolDefinition::new("search_pubmed", "Search PubMed"))
    }

    #[test]
    fn test_skill_summary() {
        let skill = research();
        assert!(skill.summary().contains("ResearchAgent"));
        assert!(skill.summary().contains("Literature search"));
    }

    #[test]
    fn test_tools_marked_as_skill_scoped() {
        let skill = research();
        assert_eq!(skill.tools[0].source, ToolSource::Skill);
        assert_eq!(skill.tool_names(), vec!["search_pubmed".to_string()]);
    }

    #[test]
    fn test_prompt_section() {
        let prompt = research().prompt_section();
        assert!(prompt.contains("Active skill: Research"));
        assert!(prompt.contains("Search and cite papers."));
        assert!(prompt.contains("Prefer systematic reviews."));
    }

    #[test]
    fn test_triggers() {
        let skill = research();
        assert!(skill.is_triggered_by("find pubmed articles"));
        assert!(!skill.is_triggered_by("write a poem"));
    }
}
