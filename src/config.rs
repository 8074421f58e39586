//! 定义了定时器的可配置参数。
//! Defines configurable parameters for the timer.

use crate::error::{Error, Result};
use std::time::Duration;

/// Which time base drives the timer. Fixed once the timer is constructed.
///
/// 驱动定时器的时间基准。定时器构造后不可更改。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClockMode {
    /// An externally advanced tick counter. Cheap to read, resolution and
    /// horizon limited by the tick cadence.
    /// 外部推进的滴答计数器。读取开销低，精度和范围受滴答间隔限制。
    Coarse,
    /// A monotonic clock sampled on every read, in milliseconds.
    /// 每次读取都采样的单调时钟，单位为毫秒。
    Precise,
}

/// A structure containing all configurable parameters for a timer.
///
/// 包含定时器所有可配置参数的结构体。
#[derive(Debug, Clone)]
pub struct Config {
    /// The maximum number of simultaneously live tasks. Storage for this many
    /// slots is reserved once, at construction.
    /// 同时存活任务的最大数量。这些槽位的存储在构造时一次性预留。
    pub capacity: usize,

    /// The time base mode.
    /// 时间基准模式。
    pub mode: ClockMode,

    /// Parameters that only apply in `ClockMode::Coarse`.
    /// 仅在 `ClockMode::Coarse` 下生效的参数。
    pub coarse: CoarseConfig,
}

/// Coarse-mode parameters.
///
/// 粗粒度模式参数。
#[derive(Debug, Clone)]
pub struct CoarseConfig {
    /// The real-time length of one tick. The ticker advances the counter at
    /// this cadence and the loop converts tick delays with it.
    /// 一个滴答对应的真实时长。
    pub tick: Duration,

    /// Number of buckets in the timing wheel that holds near-term tasks.
    /// Must be a power of two; `0` disables the wheel and keeps every task in
    /// the heap.
    ///
    /// 时间轮中保存近期任务的槽位数。必须是2的幂；`0` 表示禁用时间轮，
    /// 所有任务都保存在堆中。
    pub wheel_slots: usize,
}

impl Config {
    /// Creates a configuration with the given capacity and mode, everything
    /// else defaulted.
    pub fn new(capacity: usize, mode: ClockMode) -> Self {
        Self {
            capacity,
            mode,
            ..Self::default()
        }
    }

    /// Checks the parameters before any storage is reserved.
    /// 在预留存储之前检查参数。
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::InvalidArgument("capacity must be non-zero"));
        }
        if u32::try_from(self.capacity).is_err() {
            return Err(Error::Allocation {
                capacity: self.capacity,
            });
        }
        if self.mode == ClockMode::Coarse {
            if self.coarse.tick.is_zero() {
                return Err(Error::InvalidArgument("coarse tick must be non-zero"));
            }
            if self.coarse.wheel_slots != 0 && !self.coarse.wheel_slots.is_power_of_two() {
                return Err(Error::InvalidArgument("wheel_slots must be a power of 2"));
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: 1024,
            mode: ClockMode::Precise,
            coarse: CoarseConfig::default(),
        }
    }
}

impl Default for CoarseConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(10),
            // 512 slots * 10ms covers ~5.1 seconds of near-term deadlines
            wheel_slots: 512,
        }
    }
}
