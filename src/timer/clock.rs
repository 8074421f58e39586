//! 时间基准实现
//! Time base implementations
//!
//! 定时器所有的到期时间都以时间基准的单位表示：粗粒度模式下是滴答数，
//! 精确模式下是毫秒数。
//!
//! Every expiry in the timer is expressed in the unit of its time base: ticks
//! in coarse mode, milliseconds in precise mode.

use crate::config::ClockMode;
use crate::error::{Error, Result};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::trace;

/// The source of "now" for a timer.
/// 定时器的"当前时间"来源。
pub trait TimeBase: Send + Sync + fmt::Debug + 'static {
    /// Returns the current instant in this time base's unit.
    /// 返回以本时间基准单位表示的当前时刻。
    fn now(&self) -> Result<u64>;

    /// The real-time length of one unit.
    /// 一个单位对应的真实时长。
    fn unit(&self) -> Duration;

    /// The precision mode this time base implements.
    fn mode(&self) -> ClockMode;

    /// Converts a span of units into a real duration, saturating at
    /// `Duration::MAX`.
    ///
    /// 将若干单位转换为真实时长，溢出时饱和到 `Duration::MAX`。
    fn to_duration(&self, units: u64) -> Duration {
        let nanos = self.unit().as_nanos().saturating_mul(u128::from(units));
        let secs = nanos / 1_000_000_000;
        match u64::try_from(secs) {
            Ok(secs) => Duration::new(secs, (nanos % 1_000_000_000) as u32),
            Err(_) => Duration::MAX,
        }
    }
}

/// An externally advanced tick counter.
///
/// Clones share the same counter, so one clone can be handed to a ticker
/// task while the timer reads another.
///
/// 外部推进的滴答计数器。克隆体共享同一个计数器。
#[derive(Debug, Clone)]
pub struct CoarseClock {
    ticks: Arc<AtomicU64>,
    tick: Duration,
}

impl CoarseClock {
    /// Creates a counter starting at tick zero.
    pub fn new(tick: Duration) -> Self {
        Self {
            ticks: Arc::new(AtomicU64::new(0)),
            tick,
        }
    }

    /// Current tick count.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Advances the counter by `n` ticks and returns the new value.
    /// 将计数器推进 `n` 个滴答并返回新值。
    pub fn advance(&self, n: u64) -> u64 {
        let prev = self.ticks.fetch_add(n, Ordering::AcqRel);
        prev.wrapping_add(n)
    }

    /// Sets the counter to an absolute tick value.
    pub fn set(&self, ticks: u64) {
        self.ticks.store(ticks, Ordering::Release);
    }

    /// Spawns a tokio task that advances the counter by one every tick
    /// period. Abort the returned handle to stop it.
    ///
    /// Only for timers driven by hand with `spak`; `run_loop` already moves
    /// the counter itself and a ticker on top of it would count twice.
    ///
    /// 启动一个按滴答周期推进计数器的 tokio 任务。中止返回的句柄即可停止。
    pub fn spawn_ticker(&self) -> JoinHandle<()> {
        let clock = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(clock.tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
            // The first tick of an interval completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let now = clock.advance(1);
                trace!(ticks = now, "Coarse clock advanced");
            }
        })
    }
}

/// 按 tokio 时钟上实际经过的整数滴答推进粗粒度计数器
/// Moves a coarse counter forward by the whole ticks that elapsed on tokio's clock
///
/// The sub-tick remainder is carried over, so repeated refreshes never lose
/// or invent time.
#[derive(Debug)]
pub(crate) struct TickDriver {
    clock: CoarseClock,
    last: Instant,
}

impl TickDriver {
    pub(crate) fn new(clock: CoarseClock) -> Self {
        Self {
            clock,
            last: Instant::now(),
        }
    }

    /// 推进计数器，返回推进的滴答数
    /// Advance the counter, returning the number of ticks added
    pub(crate) fn refresh(&mut self) -> u64 {
        let now = Instant::now();
        let tick = self.clock.tick.as_nanos().max(1);
        let elapsed = now.saturating_duration_since(self.last).as_nanos();
        let ticks = elapsed / tick;
        if ticks == 0 {
            return 0;
        }

        let remainder = Duration::from_nanos(u64::try_from(elapsed % tick).unwrap_or(u64::MAX));
        self.last = now.checked_sub(remainder).unwrap_or(now);
        let ticks = u64::try_from(ticks).unwrap_or(u64::MAX);
        let current = self.clock.advance(ticks);
        trace!(ticks, current, "Coarse clock caught up");
        ticks
    }
}

impl TimeBase for CoarseClock {
    fn now(&self) -> Result<u64> {
        Ok(self.ticks())
    }

    fn unit(&self) -> Duration {
        self.tick
    }

    fn mode(&self) -> ClockMode {
        ClockMode::Coarse
    }
}

/// A monotonic millisecond clock read on every call.
///
/// Uses tokio's clock so paused-time runtimes can drive it deterministically.
///
/// 每次调用都读取的单调毫秒时钟。使用 tokio 时钟，以便暂停时间的运行时
/// 可以确定性地驱动它。
#[derive(Debug, Clone)]
pub struct PreciseClock {
    origin: Instant,
}

impl PreciseClock {
    /// Creates a clock whose zero is the moment of construction.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for PreciseClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeBase for PreciseClock {
    fn now(&self) -> Result<u64> {
        let elapsed = Instant::now()
            .checked_duration_since(self.origin)
            .ok_or_else(|| Error::ClockFailure("monotonic clock went backwards".into()))?;
        u64::try_from(elapsed.as_millis())
            .map_err(|_| Error::ClockFailure("elapsed milliseconds overflow u64".into()))
    }

    fn unit(&self) -> Duration {
        Duration::from_millis(1)
    }

    fn mode(&self) -> ClockMode {
        ClockMode::Precise
    }
}

/// The time base owned by a timer.
///
/// 定时器持有的时间基准。
#[derive(Debug, Clone)]
pub enum Clock {
    Coarse(CoarseClock),
    Precise(PreciseClock),
    /// Any other implementation, e.g. a simulated clock.
    /// 任意其他实现，例如模拟时钟。
    Custom(Arc<dyn TimeBase>),
}

impl Clock {
    /// Builds the clock for a mode.
    pub fn for_mode(mode: ClockMode, tick: Duration) -> Self {
        match mode {
            ClockMode::Coarse => Clock::Coarse(CoarseClock::new(tick)),
            ClockMode::Precise => Clock::Precise(PreciseClock::new()),
        }
    }

    /// The tick counter, if this is a coarse clock.
    pub fn as_coarse(&self) -> Option<&CoarseClock> {
        match self {
            Clock::Coarse(clock) => Some(clock),
            _ => None,
        }
    }
}

impl TimeBase for Clock {
    fn now(&self) -> Result<u64> {
        match self {
            Clock::Coarse(clock) => clock.now(),
            Clock::Precise(clock) => clock.now(),
            Clock::Custom(clock) => clock.now(),
        }
    }

    fn unit(&self) -> Duration {
        match self {
            Clock::Coarse(clock) => clock.unit(),
            Clock::Precise(clock) => clock.unit(),
            Clock::Custom(clock) => clock.unit(),
        }
    }

    fn mode(&self) -> ClockMode {
        match self {
            Clock::Coarse(clock) => clock.mode(),
            Clock::Precise(clock) => clock.mode(),
            Clock::Custom(clock) => clock.mode(),
        }
    }
}
