//! 定时器实例：构造、任务提交与取消
//! Timer instance: construction, task admission and cancellation
//!
//! `Timer` 是一个廉价可克隆的句柄，内部通过 `Arc` 共享状态，可以在线程之间
//! 传递。所有结构性修改（插入、删除、取出到期任务）都在同一把锁下完成；
//! 回调执行时从不持有该锁，因此回调中可以再次调用 `add*` / `del`。
//!
//! `Timer` is a cheaply clonable handle sharing its state through an `Arc`, so
//! it can be passed between threads. Every structural mutation (insert, remove,
//! extract due) happens under one lock; that lock is never held while a
//! callback runs, so callbacks may call `add*` / `del` again.

use crate::config::{ClockMode, Config};
use crate::error::{Error, Result};
use crate::timer::clock::{Clock, TimeBase};
use crate::timer::registry::Registry;
use crate::timer::task::{
    ClosureCallback, FireContext, Schedule, Task, TaskHandle, TaskKind, TaskRegistration,
    TaskState,
};
use crate::timer::wheel::TimingWheelStats;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;
use tracing::{debug, info, trace};

/// 每个定时器实例的唯一标识，用于识别来自其他实例的句柄
/// Unique per-instance id, used to recognise handles issued by other timers
static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) fired: u64,
    pub(crate) rescheduled: u64,
    pub(crate) cancelled: u64,
    pub(crate) rejected: u64,
}

#[derive(Debug)]
pub(crate) struct State {
    pub(crate) registry: Registry,
    pub(crate) counters: Counters,
    pub(crate) closed: bool,
}

#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) id: u64,
    pub(crate) clock: Clock,
    pub(crate) state: Mutex<State>,
    /// 唤醒正在休眠的分发循环
    /// Wakes a sleeping dispatch loop
    pub(crate) wakeup: Notify,
}

/// 定时器
/// Timer
///
/// ```
/// use kestrel_timer::Timer;
///
/// let timer = Timer::init(16, false).unwrap();
/// let handle = timer
///     .add_after(5, 0, false, |fired: &mut u32, _ctx| *fired += 1, 0u32)
///     .unwrap();
///
/// assert_eq!(timer.timeout(), Some(5));
/// assert!(timer.del(handle));
/// assert_eq!(timer.timeout(), None);
/// ```
#[derive(Clone)]
pub struct Timer {
    pub(crate) shared: Arc<Shared>,
}

/// 定时器统计信息
/// Timer statistics
#[derive(Debug, Clone)]
pub struct TimerStats {
    /// 任务槽位总数
    /// Total task slots
    pub capacity: usize,
    /// 已占用的槽位数（含正在触发的任务）
    /// Occupied slots, including firing tasks
    pub occupied: usize,
    /// 等待到期的任务数
    /// Tasks waiting for expiry
    pub pending: usize,
    /// 已执行的回调次数
    /// Callbacks executed
    pub fired: u64,
    /// 重复任务的重新调度次数
    /// Repeating task reschedules
    pub rescheduled: u64,
    /// 成功的取消次数
    /// Successful cancellations
    pub cancelled: u64,
    /// 因容量不足被拒绝的提交次数
    /// Admissions rejected for capacity
    pub rejected: u64,
    /// 时间轮统计信息（仅粗粒度模式）
    /// Timing wheel statistics (coarse mode only)
    pub wheel: Option<TimingWheelStats>,
}

impl fmt::Display for TimerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TimerStats {{ occupied: {}/{}, pending: {}, fired: {}, rescheduled: {}, cancelled: {}, rejected: {}",
            self.occupied,
            self.capacity,
            self.pending,
            self.fired,
            self.rescheduled,
            self.cancelled,
            self.rejected
        )?;
        if let Some(wheel) = &self.wheel {
            write!(f, ", wheel: {}", wheel)?;
        }
        write!(f, " }}")
    }
}

impl Timer {
    /// 创建定时器
    /// Create a timer
    ///
    /// # Arguments
    /// * `capacity` - 同时存活任务的最大数量
    /// * `precise` - 是否使用精确时钟（否则使用粗粒度滴答计数器）
    ///
    /// # Arguments (English)
    /// * `capacity` - Maximum number of simultaneously live tasks
    /// * `precise` - Use the precise clock instead of the coarse tick counter
    pub fn init(capacity: usize, precise: bool) -> Result<Self> {
        let mode = if precise {
            ClockMode::Precise
        } else {
            ClockMode::Coarse
        };
        Self::new(Config::new(capacity, mode))
    }

    /// 按配置创建定时器
    /// Create a timer from a configuration
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let clock = Clock::for_mode(config.mode, config.coarse.tick);
        Self::build(&config, clock)
    }

    /// 使用自定义时间基准创建定时器；时间轮是否启用取决于时间基准的模式
    /// Create a timer on a custom time base; whether the wheel is used follows
    /// the time base's mode
    pub fn with_time_base(config: Config, time_base: Arc<dyn TimeBase>) -> Result<Self> {
        let config = Config {
            mode: time_base.mode(),
            ..config
        };
        config.validate()?;
        Self::build(&config, Clock::Custom(time_base))
    }

    fn build(config: &Config, clock: Clock) -> Result<Self> {
        let id = NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed);
        let wheel = if clock.mode() == ClockMode::Coarse && config.coarse.wheel_slots > 0 {
            Some((config.coarse.wheel_slots, clock.now()?))
        } else {
            None
        };
        let registry = Registry::new(id, config.capacity, wheel)?;

        info!(
            timer_id = id,
            capacity = config.capacity,
            mode = ?clock.mode(),
            wheel = config.coarse.wheel_slots,
            "Timer initialized"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                id,
                clock,
                state: Mutex::new(State {
                    registry,
                    counters: Counters::default(),
                    closed: false,
                }),
                wakeup: Notify::new(),
            }),
        })
    }

    /// 关闭定时器
    /// Shut the timer down
    ///
    /// Pending tasks are discarded **without** running their callbacks; drain
    /// or cancel them first if firing on shutdown matters. Other clones of
    /// this timer reject further admissions with `Error::Shutdown` and their
    /// dispatch loops stop. Returns the number of discarded tasks.
    ///
    /// 待处理任务被直接丢弃，不会执行回调。返回被丢弃的任务数。
    pub fn exit(self) -> usize {
        let discarded = {
            let mut state = self.shared.state.lock();
            state.closed = true;
            state.registry.clear()
        };
        self.shared.wakeup.notify_waiters();
        self.shared.wakeup.notify_one();

        info!(timer_id = self.shared.id, discarded, "Timer shut down");
        discarded
    }

    /// 运行任务：`period` 之后首次触发，由引擎持有，无法取消
    /// Run a task first due after `period`; engine owned, cannot be cancelled
    pub fn run<D, F>(&self, period: u64, repeat: bool, callback: F, data: D) -> Result<()>
    where
        D: Send + 'static,
        F: FnMut(&mut D, &FireContext) + Send + 'static,
    {
        self.run_after(period, period, repeat, callback, data)
    }

    /// 在绝对时间 `when` 运行任务
    /// Run a task at absolute time `when`
    pub fn run_at<D, F>(&self, when: u64, period: u64, repeat: bool, callback: F, data: D) -> Result<()>
    where
        D: Send + 'static,
        F: FnMut(&mut D, &FireContext) + Send + 'static,
    {
        self.schedule_detached(registration(Schedule::At(when), period, repeat, callback, data))
    }

    /// 在相对时间 `after` 之后运行任务
    /// Run a task `after` units from now
    pub fn run_after<D, F>(
        &self,
        after: u64,
        period: u64,
        repeat: bool,
        callback: F,
        data: D,
    ) -> Result<()>
    where
        D: Send + 'static,
        F: FnMut(&mut D, &FireContext) + Send + 'static,
    {
        self.schedule_detached(registration(Schedule::After(after), period, repeat, callback, data))
    }

    /// 添加任务：`period` 之后首次触发，返回可用于取消的句柄
    /// Add a task first due after `period`, returning a handle for cancellation
    pub fn add<D, F>(&self, period: u64, repeat: bool, callback: F, data: D) -> Result<TaskHandle>
    where
        D: Send + 'static,
        F: FnMut(&mut D, &FireContext) + Send + 'static,
    {
        self.add_after(period, period, repeat, callback, data)
    }

    /// 在绝对时间 `when` 添加任务
    /// Add a task at absolute time `when`
    pub fn add_at<D, F>(
        &self,
        when: u64,
        period: u64,
        repeat: bool,
        callback: F,
        data: D,
    ) -> Result<TaskHandle>
    where
        D: Send + 'static,
        F: FnMut(&mut D, &FireContext) + Send + 'static,
    {
        self.schedule(registration(Schedule::At(when), period, repeat, callback, data))
    }

    /// 在相对时间 `after` 之后添加任务
    /// Add a task `after` units from now
    pub fn add_after<D, F>(
        &self,
        after: u64,
        period: u64,
        repeat: bool,
        callback: F,
        data: D,
    ) -> Result<TaskHandle>
    where
        D: Send + 'static,
        F: FnMut(&mut D, &FireContext) + Send + 'static,
    {
        self.schedule(registration(Schedule::After(after), period, repeat, callback, data))
    }

    /// 提交注册请求，返回句柄
    /// Admit a registration, returning its handle
    pub fn schedule(&self, registration: TaskRegistration) -> Result<TaskHandle> {
        self.admit(registration, TaskKind::Add)
    }

    /// 提交注册请求，任务由引擎持有
    /// Admit a registration owned by the engine
    pub fn schedule_detached(&self, registration: TaskRegistration) -> Result<()> {
        self.admit(registration, TaskKind::Run).map(|_| ())
    }

    fn admit(&self, registration: TaskRegistration, kind: TaskKind) -> Result<TaskHandle> {
        let (schedule, period, repeat, callback) = registration
            .validate()
            .inspect_err(|err| debug!(timer_id = self.shared.id, %err, "Task rejected"))?;

        let expiry = match schedule {
            Schedule::At(when) => when,
            Schedule::After(after) => self.shared.clock.now()?.saturating_add(after),
        };

        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(Error::Shutdown);
        }
        let earliest = state.registry.peek_min();
        let task = Task::new(expiry, period, repeat, kind, callback);
        match state.registry.insert(task) {
            Ok(handle) => {
                drop(state);
                trace!(timer_id = self.shared.id, ?handle, expiry, period, repeat, "Task admitted");
                // 新任务成为最早到期者时唤醒分发循环
                // Wake the dispatch loop when the new task becomes the earliest
                if earliest.is_none_or(|earliest| expiry < earliest) {
                    self.shared.wakeup.notify_one();
                }
                Ok(handle)
            }
            Err(err) => {
                state.counters.rejected += 1;
                debug!(timer_id = self.shared.id, %err, "Task rejected");
                Err(err)
            }
        }
    }

    /// 取消任务
    /// Cancel a task
    ///
    /// Never fails and never waits for an in-flight callback. Stale handles,
    /// handles of other timers and already fired one-shots are no-ops. A
    /// repeating task cancelled while its callback runs finishes that firing
    /// and is not rescheduled. Returns whether a future firing was prevented.
    ///
    /// 取消从不失败，也不会等待正在执行的回调。返回是否阻止了后续触发。
    pub fn del(&self, handle: TaskHandle) -> bool {
        let mut state = self.shared.state.lock();
        let cancelled = state.registry.remove(handle);
        if cancelled {
            state.counters.cancelled += 1;
        }
        trace!(timer_id = self.shared.id, ?handle, cancelled, "Task cancellation");
        cancelled
    }

    /// 任务当前状态；句柄过期时返回 None
    /// Current state of a task; None once the handle is stale
    pub fn state(&self, handle: TaskHandle) -> Option<TaskState> {
        self.shared.state.lock().registry.state(handle)
    }

    /// 读取时间基准的当前时间
    /// Read the time base's current time
    pub fn now(&self) -> Result<u64> {
        self.shared.clock.now()
    }

    pub fn clock(&self) -> &Clock {
        &self.shared.clock
    }

    pub fn mode(&self) -> ClockMode {
        self.shared.clock.mode()
    }

    pub fn capacity(&self) -> usize {
        self.shared.state.lock().registry.capacity()
    }

    /// 已占用的槽位数
    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.shared.state.lock().registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// 获取统计信息
    /// Get statistics
    pub fn stats(&self) -> TimerStats {
        let state = self.shared.state.lock();
        TimerStats {
            capacity: state.registry.capacity(),
            occupied: state.registry.len(),
            pending: state.registry.pending(),
            fired: state.counters.fired,
            rescheduled: state.counters.rescheduled,
            cancelled: state.counters.cancelled,
            rejected: state.counters.rejected,
            wheel: state.registry.wheel_stats(),
        }
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("id", &self.shared.id)
            .field("mode", &self.shared.clock.mode())
            .finish()
    }
}

fn registration<D, F>(
    schedule: Schedule,
    period: u64,
    repeat: bool,
    callback: F,
    data: D,
) -> TaskRegistration
where
    D: Send + 'static,
    F: FnMut(&mut D, &FireContext) + Send + 'static,
{
    let registration = match schedule {
        Schedule::At(when) => TaskRegistration::at(when),
        Schedule::After(after) => TaskRegistration::after(after),
    };
    registration
        .periodic(period, repeat)
        .callback(ClosureCallback::new(data, callback))
}
