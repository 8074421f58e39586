#![deny(clippy::expect_used, clippy::unwrap_used)]

//! The root of the low-overhead timer scheduling library.
//! 低开销定时器调度库的根。

pub mod config;
pub mod error;
pub mod timer;

#[cfg(test)]
mod testing;

pub use config::{ClockMode, CoarseConfig, Config};
pub use error::{Error, Result};
pub use timer::{
    Clock, ClosureCallback, CoarseClock, ExpiredEvent, FireContext, PreciseClock, Schedule,
    SenderCallback, TaskCallback, TaskHandle, TaskRegistration, TaskState, TimeBase, Timer,
    TimerLoopHandle, TimerStats, TimingWheelStats, start_timer_loop,
};
