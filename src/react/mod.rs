//! 驱动层：回合循环、过程事件

pub mod events;
pub mod loop_;

pub use events::ReactEvent;
pub(crate) use loop_::send_event;
pub use loop_::{build_system_prompt, run_task, run_turn, DelegateTarget, NextAction, RunOutcome};
