//! 技能加载器
//!
//! 从 config/skills/ 目录加载技能定义，交给 SkillManager::register_all。
//!
//! 目录结构：
//! ```text
//! config/skills/
//! ├── research/
//! │   ├── skill.toml      # 技能元数据与工具定义
//! │   ├── capability.md   # 能力描述（可选，覆盖 skill.toml 中的 prompt.capability）
//! │   └── direction.md    # 行为指引（可选，覆盖 skill.toml 中的 prompt.direction）
//! └── ...
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::skills::Skill;
use crate::tools::ToolDefinition;

/// 技能元数据（skill.toml 的 [skill] 段）
#[derive(Debug, Clone, Deserialize)]
pub struct SkillMeta {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub triggers: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PromptToml {
    #[serde(default)]
    capability: String,
    #[serde(default)]
    direction: String,
}

#[derive(Debug, Deserialize)]
struct SkillToml {
    skill: SkillMeta,
    #[serde(default)]
    prompt: PromptToml,
    #[serde(default)]
    tools: Vec<ToolDefinition>,
}

/// 技能加载器
pub struct SkillLoader {
    skills_dir: PathBuf,
}

impl SkillLoader {
    pub fn new(skills_dir: impl AsRef<Path>) -> Self {
        Self {
            skills_dir: skills_dir.as_ref().to_path_buf(),
        }
    }

    /// 从默认位置创建
    pub fn from_default() -> Self {
        let dirs = [
            PathBuf::from("config/skills"),
            PathBuf::from("../config/skills"),
        ];
        let skills_dir = dirs
            .into_iter()
            .find(|d| d.exists())
            .unwrap_or_else(|| PathBuf::from("config/skills"));
        Self::new(skills_dir)
    }

    pub fn skills_dir(&self) -> &Path {
        &self.skills_dir
    }

    /// 加载目录下全部技能；目录不存在时返回空列表，单个技能解析失败仅告警并跳过
    pub fn load_all(&self) -> anyhow::Result<Vec<Skill>> {
        let mut skills = Vec::new();

        if !self.skills_dir.exists() {
            return Ok(skills);
        }

        let mut dirs: Vec<PathBuf> = std::fs::read_dir(&self.skills_dir)?
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();

        for dir in dirs {
            match Self::load_skill(&dir) {
                Ok(Some(skill)) => skills.push(skill),
                Ok(None) => {}
                Err(e) => tracing::warn!(dir = %dir.display(), error = %e, "skipping invalid skill"),
            }
        }

        tracing::info!("Loaded {} skills", skills.len());
        Ok(skills)
    }

    /// 加载单个技能；没有 skill.toml 的目录返回 None
    pub fn load_skill(dir: &Path) -> anyhow::Result<Option<Skill>> {
        let skill_toml = dir.join("skill.toml");
        if !skill_toml.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&skill_toml)?;
        let data: SkillToml = toml::from_str(&content)?;
        let meta = data.skill;

        let capability = std::fs::read_to_string(dir.join("capability.md"))
            .unwrap_or(data.prompt.capability);
        let direction =
            std::fs::read_to_string(dir.join("direction.md")).unwrap_or(data.prompt.direction);

        let mut skill = Skill::new(meta.name.clone(), meta.description)
            .with_triggers(meta.triggers)
            .with_prompt(capability, direction);
        if let Some(display_name) = meta.display_name {
            skill = skill.with_display_name(display_name);
        }
        for tool in data.tools {
            skill = skill.with_tool_definition(tool);
        }
        Ok(Some(skill))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const RESEARCH_TOML: &str = r#"
[skill]
name = "ResearchAgent"
display_name = "Research"
description = "Searches the medical literature"
triggers = ["pubmed", "literature"]

[prompt]
capability = "inline capability"
direction = "inline direction"

[[tools]]
name = "search_pubmed"
description = "Search PubMed"

[tools.parameters.query]
type = "string"
required = true
"#;

    #[test]
    fn test_load_all() {
        let root = TempDir::new().unwrap();
        let research = root.path().join("research");
        std::fs::create_dir_all(&research).unwrap();
        std::fs::write(research.join("skill.toml"), RESEARCH_TOML).unwrap();
        std::fs::write(research.join("capability.md"), "Cite sources.").unwrap();
        std::fs::create_dir_all(root.path().join("empty")).unwrap();
        let broken = root.path().join("broken");
        std::fs::create_dir_all(&broken).unwrap();
        std::fs::write(broken.join("skill.toml"), "not = [valid").unwrap();

        let skills = SkillLoader::new(root.path()).load_all().unwrap();
        assert_eq!(skills.len(), 1);
        let skill = &skills[0];
        assert_eq!(skill.name, "ResearchAgent");
        assert_eq!(skill.display_name, "Research");
        assert_eq!(skill.prompt.capability, "Cite sources.");
        assert_eq!(skill.prompt.direction, "inline direction");
        assert_eq!(skill.tool_names(), vec!["search_pubmed".to_string()]);
        assert!(skill.tools[0]
            .definition
            .parameters
            .validate(&serde_json::json!({}))
            .is_err());
    }

    #[test]
    fn test_missing_dir() {
        let loader = SkillLoader::new("/definitely/not/here");
        assert!(loader.load_all().unwrap().is_empty());
    }
}
