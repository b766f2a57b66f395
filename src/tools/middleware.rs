//! 工具中间件：以显式组合代替注解
//!
//! MiddlewareStack 按声明顺序包装 handler（第一个为最外层），layer_names() 暴露包装顺序。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{ParamSchema, Tool};

/// 可用的中间件
#[derive(Clone, Debug, PartialEq)]
pub enum Middleware {
    /// 失败后重试，最多 max_attempts 次（含首次）
    Retry { max_attempts: u32, backoff: Duration },
    /// 按参数缓存成功结果
    Cache { max_entries: usize },
}

impl Middleware {
    pub fn name(&self) -> String {
        match self {
            Middleware::Retry { max_attempts, .. } => format!("retry({max_attempts})"),
            Middleware::Cache { max_entries } => format!("cache({max_entries})"),
        }
    }

    fn wrap(&self, inner: Arc<dyn Tool>) -> Arc<dyn Tool> {
        match self {
            Middleware::Retry {
                max_attempts,
                backoff,
            } => Arc::new(RetryTool {
                inner,
                max_attempts: (*max_attempts).max(1),
                backoff: *backoff,
            }),
            Middleware::Cache { max_entries } => Arc::new(CachedTool {
                inner,
                max_entries: *max_entries,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }
}

/// 中间件栈
#[derive(Clone, Debug, Default)]
pub struct MiddlewareStack {
    layers: Vec<Middleware>,
}

impl MiddlewareStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, layer: Middleware) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn layer_names(&self) -> Vec<String> {
        self.layers.iter().map(Middleware::name).collect()
    }

    /// 包装 handler：从最内层开始，所以逆序应用
    pub fn wrap(&self, handler: Arc<dyn Tool>) -> Arc<dyn Tool> {
        self.layers
            .iter()
            .rev()
            .fold(handler, |inner, layer| layer.wrap(inner))
    }
}

struct RetryTool {
    inner: Arc<dyn Tool>,
    max_attempts: u32,
    backoff: Duration,
}

#[async_trait]
impl Tool for RetryTool {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn parameters_schema(&self) -> ParamSchema {
        self.inner.parameters_schema()
    }

    fn is_side_effect_free(&self) -> bool {
        self.inner.is_side_effect_free()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let mut attempt = 1;
        loop {
            match self.inner.execute(args.clone()).await {
                Ok(out) => return Ok(out),
                Err(e) if attempt >= self.max_attempts => return Err(e),
                Err(e) => {
                    tracing::warn!(tool = %self.inner.name(), attempt, error = %e, "tool failed, retrying");
                    attempt += 1;
                    if !self.backoff.is_zero() {
                        tokio::time::sleep(self.backoff).await;
                    }
                }
            }
        }
    }
}

struct CachedTool {
    inner: Arc<dyn Tool>,
    max_entries: usize,
    entries: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl Tool for CachedTool {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn parameters_schema(&self) -> ParamSchema {
        self.inner.parameters_schema()
    }

    fn is_side_effect_free(&self) -> bool {
        self.inner.is_side_effect_free()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let key = args.to_string();
        if let Some(hit) = self
            .entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(&key).cloned())
        {
            tracing::debug!(tool = %self.inner.name(), "tool cache hit");
            return Ok(hit);
        }
        let out = self.inner.execute(args).await?;
        if let Ok(mut entries) = self.entries.lock() {
            if entries.len() >= self.max_entries {
                entries.clear();
            }
            if self.max_entries > 0 {
                entries.insert(key, out.clone());
            }
        }
        Ok(out)
    }
}
