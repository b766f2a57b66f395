//! 技能系统
//!
//! 技能（Skill）是一组能力描述、行为指引与专属工具的集合；同一会话同一时刻至多激活一个技能，
//! 激活期间其提示词拼入 system prompt，其工具加入可用工具集。

mod loader;
mod manager;
mod skill;

pub use loader::{SkillLoader, SkillMeta};
pub use manager::{SkillActivation, SkillChange, SkillDeactivation, SkillManager};
pub use skill::{Skill, SkillHooks, SkillPrompt};
