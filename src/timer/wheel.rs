//! 时间轮数据结构实现
//! Timing Wheel Data Structure Implementation
//!
//! 粗粒度模式下，近期到期的任务被放入按滴答索引的时间轮中，插入和到期均为
//! O(1)。超出时间轮覆盖范围的任务溢出到堆中。
//!
//! In coarse mode near-term tasks are bucketed into a tick-indexed wheel with
//! O(1) insert and expiry. Tasks beyond the wheel's horizon overflow into the
//! heap.

mod core;
mod stats;

pub(crate) use self::core::TimingWheel;
pub use self::stats::TimingWheelStats;
