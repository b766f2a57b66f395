//! 技能管理器：注册表 + 激活状态机
//!
//! Inactive ⇄ Active(skill)。每个会话持有自己的 SkillManager，激活指针只能经由本类型的方法修改。
//! 激活未知技能不会报错，而是返回 success=false 并列出可用技能名，让模型换名重试。

use std::collections::HashMap;

use crate::skills::Skill;
use crate::tools::ToolRegistration;

/// 激活变化通知
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkillChange {
    pub previous: Option<String>,
    pub current: Option<String>,
}

type ChangeListener = Box<dyn Fn(&SkillChange) + Send + Sync>;

/// activate_skill 的结构化结果
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SkillActivation {
    pub success: bool,
    pub skill: Option<String>,
    pub message: String,
    /// 新暴露给模型的工具名
    pub tools: Vec<String>,
    /// 失败时列出的可用技能
    pub available: Vec<String>,
    /// 钩子失败不回滚激活，但在此上报
    pub hook_errors: Vec<String>,
}

/// deactivate_skill 的结构化结果
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SkillDeactivation {
    pub success: bool,
    pub deactivated: Option<String>,
    pub hook_errors: Vec<String>,
}

#[derive(Default)]
pub struct SkillManager {
    skills: HashMap<String, Skill>,
    active: Option<String>,
    listener: Option<ChangeListener>,
}

impl SkillManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册技能；同名覆盖并告警
    pub fn register(&mut self, skill: Skill) {
        let name = skill.name.clone();
        if self.skills.insert(name.clone(), skill).is_some() {
            tracing::warn!(skill = %name, "skill re-registered, previous definition replaced");
        } else {
            tracing::debug!(skill = %name, "skill registered");
        }
    }

    pub fn register_all(&mut self, skills: impl IntoIterator<Item = Skill>) {
        for skill in skills {
            self.register(skill);
        }
    }

    /// 注销技能；当前激活的技能或未知名称返回 false
    pub fn unregister(&mut self, name: &str) -> bool {
        if self.active.as_deref() == Some(name) {
            tracing::warn!(skill = %name, "refusing to unregister the active skill");
            return false;
        }
        self.skills.remove(name).is_some()
    }

    pub fn set_change_listener(&mut self, listener: impl Fn(&SkillChange) + Send + Sync + 'static) {
        self.listener = Some(Box::new(listener));
    }

    pub fn get(&self, name: &str) -> Option<&Skill> {
        self.skills.get(name)
    }

    pub fn available_skill_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.skills.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn list_skills(&self) -> Vec<&Skill> {
        let mut skills: Vec<&Skill> = self.skills.values().collect();
        skills.sort_by(|a, b| a.name.cmp(&b.name));
        skills
    }

    pub async fn activate_skill(&mut self, name: &str) -> SkillActivation {
        let Some(skill) = self.skills.get(name) else {
            let available = self.available_skill_names();
            let listed = if available.is_empty() {
                "(none registered)".to_string()
            } else {
                available.join(", ")
            };
            tracing::warn!(skill = %name, "activation requested for unknown skill");
            return SkillActivation {
                success: false,
                skill: None,
                message: format!("Skill '{name}' not found. Available skills: {listed}"),
                available,
                ..Default::default()
            };
        };

        if self.active.as_deref() == Some(name) {
            return SkillActivation {
                success: true,
                skill: Some(name.to_string()),
                message: format!("Skill '{name}' is already active"),
                tools: skill.tool_names(),
                ..Default::default()
            };
        }

        let next_hooks = skill.hooks.clone();
        let tools = skill.tool_names();
        let mut hook_errors = Vec::new();

        let previous = self.active.clone();
        if let Some(prev) = previous.as_deref() {
            if let Some(err) = self.run_deactivate_hook(prev).await {
                hook_errors.push(err);
            }
        }

        self.active = Some(name.to_string());
        tracing::info!(skill = %name, previous = ?previous, "skill activated");

        if let Some(hooks) = next_hooks {
            if let Err(e) = hooks.on_activate().await {
                tracing::warn!(skill = %name, error = %e, "on_activate hook failed; skill stays active");
                hook_errors.push(format!("{name}.on_activate: {e}"));
            }
        }

        self.notify(previous, Some(name.to_string()));

        SkillActivation {
            success: true,
            skill: Some(name.to_string()),
            message: format!("Skill '{name}' activated with {} tool(s)", tools.len()),
            tools,
            available: Vec::new(),
            hook_errors,
        }
    }

    pub async fn deactivate_skill(&mut self) -> SkillDeactivation {
        let Some(current) = self.active.clone() else {
            return SkillDeactivation {
                success: true,
                ..Default::default()
            };
        };
        let hook_errors = self.run_deactivate_hook(&current).await.into_iter().collect();
        self.active = None;
        tracing::info!(skill = %current, "skill deactivated");
        self.notify(Some(current.clone()), None);
        SkillDeactivation {
            success: true,
            deactivated: Some(current),
            hook_errors,
        }
    }

    async fn run_deactivate_hook(&self, name: &str) -> Option<String> {
        let hooks = self.skills.get(name)?.hooks.clone()?;
        match hooks.on_deactivate().await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(skill = %name, error = %e, "on_deactivate hook failed");
                Some(format!("{name}.on_deactivate: {e}"))
            }
        }
    }

    fn notify(&self, previous: Option<String>, current: Option<String>) {
        if let Some(listener) = &self.listener {
            listener(&SkillChange { previous, current });
        }
    }

    pub fn get_active_skill(&self) -> Option<&Skill> {
        self.active.as_deref().and_then(|name| self.skills.get(name))
    }

    /// 当前激活技能的工具；每次从技能定义重新计算
    pub fn get_active_tools(&self) -> Vec<ToolRegistration> {
        self.get_active_skill()
            .map(|s| s.tools.clone())
            .unwrap_or_default()
    }

    /// 激活技能的提示词段落；未激活时为空
    pub fn active_prompt(&self) -> String {
        self.get_active_skill()
            .map(Skill::prompt_section)
            .unwrap_or_default()
    }

    /// 触发词命中的技能名（按名称排序）
    pub fn match_triggers(&self, text: &str) -> Vec<String> {
        self.list_skills()
            .into_iter()
            .filter(|s| s.is_triggered_by(text))
            .map(|s| s.name.clone())
            .collect()
    }

    /// 可用技能列表段落，供 system prompt 提示模型可激活的技能
    pub fn skills_overview(&self) -> String {
        if self.skills.is_empty() {
            return String::new();
        }
        let mut s = String::from("## Available skills\n");
        for skill in self.list_skills() {
            s.push_str(&format!("- {}\n", skill.summary()));
        }
        s
    }
}
