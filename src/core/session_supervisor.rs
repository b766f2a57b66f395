//! 会话监管：取消与中止判定
//!
//! 持有 CancellationToken；is_aborted() 作为协作式取消的判定函数传给 ToolExecutor，
//! 在两次工具调用之间检查，不强行中断正在进行的外部调用。

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct SessionSupervisor {
    cancel_token: CancellationToken,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 触发取消（用户 Ctrl+C / 上层停止）
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// 创建子 token（用于单次外部调用）
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}
