//! 定时器任务定义
//! Timer task definitions
//!
//! 该模块定义了可调度的任务单元、任务句柄、回调 trait 以及注册请求。
//! 通过 `run*` 提交的任务由引擎持有，触发完毕后自动释放；通过 `add*`
//! 提交的任务返回句柄，调用者可在其触发前取消。
//!
//! This module defines the schedulable task unit, task handles, the callback
//! trait and registration requests. Tasks submitted through `run*` are owned
//! by the engine and released automatically once they stop repeating; tasks
//! submitted through `add*` return a handle the caller can cancel with.

pub mod handle;
pub mod types;

pub use handle::TaskHandle;
pub use types::{
    ClosureCallback, ExpiredEvent, FireContext, Schedule, SenderCallback, TaskCallback,
    TaskRegistration, TaskState,
};
pub(crate) use types::{Task, TaskKind};
