//! 定时器调度模块
//! Timer Scheduling Module
//!
//! 该模块实现了一个低开销的定时器调度器：调用者提交在某个时间点（可选地周期性）
//! 执行的回调，然后通过 `timeout` / `spak` 驱动分发，或者使用基于 tokio 的
//! 分发循环。待处理任务存放在固定容量的注册表中，按 `(到期时间, 提交顺序)` 排序；
//! 粗粒度模式下近期任务由时间轮管理。
//!
//! This module implements a low-overhead timer scheduler: callers submit
//! callbacks to run at a point in time, optionally periodically, then drive
//! dispatch through `timeout` / `spak` or the tokio based dispatch loop.
//! Pending tasks live in a fixed-capacity registry ordered by
//! `(expiry, admission order)`; in coarse mode near-term tasks are kept in a
//! timing wheel.

pub mod clock;
pub mod dispatcher;
pub mod engine;
pub(crate) mod registry;
pub mod task;
pub mod wheel;


pub use clock::{Clock, CoarseClock, PreciseClock, TimeBase};
pub use dispatcher::{TimerLoopHandle, start_timer_loop};
pub use engine::{Timer, TimerStats};
pub use task::{
    ClosureCallback, ExpiredEvent, FireContext, Schedule, SenderCallback, TaskCallback,
    TaskHandle, TaskRegistration, TaskState,
};
pub use wheel::TimingWheelStats;
