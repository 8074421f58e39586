//! 测试辅助工具模块
//! Test utilities module

#![cfg(test)]

use crate::config::{ClockMode, Config};
use crate::error::{Error, Result};
use crate::timer::{FireContext, TimeBase, Timer};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// A millisecond time base moved only by the test.
///
/// 只由测试推进的毫秒时间基准。
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start)),
        }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, by: u64) -> u64 {
        self.now.fetch_add(by, Ordering::SeqCst) + by
    }
}

impl TimeBase for ManualClock {
    fn now(&self) -> Result<u64> {
        Ok(self.now.load(Ordering::SeqCst))
    }

    fn unit(&self) -> Duration {
        Duration::from_millis(1)
    }

    fn mode(&self) -> ClockMode {
        ClockMode::Precise
    }
}

/// A time base that can be switched into a failing state.
///
/// 可以切换到故障状态的时间基准。
#[derive(Debug, Clone, Default)]
pub struct FailingClock {
    inner: ManualClock,
    failing: Arc<AtomicBool>,
}

impl FailingClock {
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set(&self, now: u64) {
        self.inner.set(now);
    }
}

impl TimeBase for FailingClock {
    fn now(&self) -> Result<u64> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::ClockFailure("simulated clock fault".into()));
        }
        self.inner.now()
    }

    fn unit(&self) -> Duration {
        self.inner.unit()
    }

    fn mode(&self) -> ClockMode {
        self.inner.mode()
    }
}

/// Collects labelled firings in the order callbacks ran.
///
/// 按回调执行顺序记录带标签的触发。
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    fired: Arc<Mutex<Vec<(&'static str, FireContext)>>>,
}

impl Recorder {
    /// A callback that records `label` each time it fires.
    pub fn callback(&self, label: &'static str) -> impl FnMut(&FireContext) + Send + 'static {
        let fired = Arc::clone(&self.fired);
        move |ctx: &FireContext| fired.lock().push((label, *ctx))
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.fired.lock().iter().map(|(label, _)| *label).collect()
    }

    pub fn contexts(&self) -> Vec<FireContext> {
        self.fired.lock().iter().map(|(_, ctx)| *ctx).collect()
    }

    pub fn count(&self, label: &str) -> usize {
        self.fired.lock().iter().filter(|(l, _)| *l == label).count()
    }
}

/// A timer on a fresh `ManualClock` starting at 0.
pub fn manual_timer(capacity: usize) -> (Timer, ManualClock) {
    let clock = ManualClock::new(0);
    let timer = Timer::with_time_base(
        Config::new(capacity, ClockMode::Precise),
        Arc::new(clock.clone()),
    )
    .unwrap();
    (timer, clock)
}
