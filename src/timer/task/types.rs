//! 定时器任务类型定义
//! Timer task type definitions

use crate::error::{Error, Result};
use std::fmt;
use tokio::sync::mpsc;

use super::handle::TaskHandle;

/// 任务生命周期状态
/// Task lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// 等待到期
    /// Waiting in the registry for its expiry
    Pending,
    /// 回调正在执行
    /// Its callback is executing inside a dispatch pass
    Firing,
    /// 在触发过程中被取消，本次触发结束后释放
    /// Cancelled while firing; released once the current firing completes
    Cancelled,
}

/// Who owns a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskKind {
    /// Admitted with `run*`; the engine frees it, no handle escapes.
    Run,
    /// Admitted with `add*`; the caller holds a handle.
    Add,
}

/// 传给回调的触发上下文
/// Firing context passed to callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FireContext {
    /// 任务句柄（仅 `add*` 任务）
    /// The task's handle, for tasks admitted with `add*`
    pub handle: Option<TaskHandle>,
    /// 本次分发读取到的当前时间
    /// The `now` read by the dispatch pass
    pub now: u64,
    /// 任务计划的到期时间
    /// The expiry the task was scheduled for
    pub expiry: u64,
    /// 第几次触发（从1开始）
    /// 1-based firing ordinal
    pub firing: u64,
}

/// 定时器回调 trait
/// Timer callback trait
///
/// Callbacks run synchronously on the thread that calls `spak`, outside the
/// registry lock. A callback that blocks delays every task due after it, so
/// keep them short and hand real work off elsewhere.
///
/// 回调在调用 `spak` 的线程上同步执行，且不持有注册表锁。
/// 阻塞的回调会推迟其后所有到期任务，因此回调应当简短。
pub trait TaskCallback: Send + 'static {
    /// 处理任务到期
    /// Handle task expiry
    fn on_expired(&mut self, ctx: &FireContext);
}

impl<F> TaskCallback for F
where
    F: FnMut(&FireContext) + Send + 'static,
{
    fn on_expired(&mut self, ctx: &FireContext) {
        self(ctx)
    }
}

/// 携带用户数据的闭包回调
/// Closure callback carrying user data
pub struct ClosureCallback<D, F>
where
    D: Send + 'static,
    F: FnMut(&mut D, &FireContext) + Send + 'static,
{
    data: D,
    callback: F,
}

impl<D, F> ClosureCallback<D, F>
where
    D: Send + 'static,
    F: FnMut(&mut D, &FireContext) + Send + 'static,
{
    /// 创建新的闭包回调
    /// Create new closure callback
    pub fn new(data: D, callback: F) -> Self {
        Self { data, callback }
    }
}

impl<D, F> fmt::Debug for ClosureCallback<D, F>
where
    D: Send + 'static,
    F: FnMut(&mut D, &FireContext) + Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureCallback")
            .field("callback", &"<closure>")
            .finish()
    }
}

impl<D, F> TaskCallback for ClosureCallback<D, F>
where
    D: Send + 'static,
    F: FnMut(&mut D, &FireContext) + Send + 'static,
{
    fn on_expired(&mut self, ctx: &FireContext) {
        (self.callback)(&mut self.data, ctx)
    }
}

/// 通过通道投递的到期事件
/// Expiry event delivered through a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredEvent<E> {
    pub data: E,
    pub handle: Option<TaskHandle>,
    pub now: u64,
    pub expiry: u64,
}

/// 基于 mpsc::Sender 的回调实现
/// mpsc::Sender-based callback implementation
///
/// Posts a clone of its event with `try_send`, so a full or closed channel
/// never blocks the dispatch pass.
#[derive(Debug, Clone)]
pub struct SenderCallback<E: Clone + Send + 'static> {
    sender: mpsc::Sender<ExpiredEvent<E>>,
    event: E,
}

impl<E: Clone + Send + 'static> SenderCallback<E> {
    /// 创建新的发送者回调
    /// Create new sender callback
    pub fn new(sender: mpsc::Sender<ExpiredEvent<E>>, event: E) -> Self {
        Self { sender, event }
    }
}

impl<E: Clone + Send + 'static> TaskCallback for SenderCallback<E> {
    fn on_expired(&mut self, ctx: &FireContext) {
        let event = ExpiredEvent {
            data: self.event.clone(),
            handle: ctx.handle,
            now: ctx.now,
            expiry: ctx.expiry,
        };
        // 使用 try_send 避免阻塞，如果发送失败则记录警告
        // Use try_send to avoid blocking, log warning if send fails
        if let Err(e) = self.sender.try_send(event) {
            tracing::warn!(expiry = ctx.expiry, "Failed to send timer event: {}", e);
        }
    }
}

/// When a task first becomes due.
/// 任务首次到期的时间。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// 绝对时间
    /// Absolute time in the time base's unit
    At(u64),
    /// 相对当前时间的延迟
    /// Delay relative to the moment of admission
    After(u64),
}

/// 定时器任务注册请求
/// Timer task registration request
///
/// ```
/// use kestrel_timer::TaskRegistration;
///
/// let registration = TaskRegistration::after(50)
///     .repeat(10)
///     .callback(|ctx: &kestrel_timer::FireContext| println!("fired at {}", ctx.now));
/// # let _ = registration;
/// ```
pub struct TaskRegistration {
    pub(crate) schedule: Schedule,
    pub(crate) period: u64,
    pub(crate) repeat: bool,
    pub(crate) callback: Option<Box<dyn TaskCallback>>,
}

impl TaskRegistration {
    /// A one-shot task due at absolute time `when`.
    pub fn at(when: u64) -> Self {
        Self::new(Schedule::At(when))
    }

    /// A one-shot task due `after` units from admission.
    pub fn after(after: u64) -> Self {
        Self::new(Schedule::After(after))
    }

    fn new(schedule: Schedule) -> Self {
        Self {
            schedule,
            period: 0,
            repeat: false,
            callback: None,
        }
    }

    /// Makes the task repeat every `period` units after it first fires.
    /// 使任务在首次触发后每隔 `period` 个单位重复。
    pub fn repeat(mut self, period: u64) -> Self {
        self.period = period;
        self.repeat = true;
        self
    }

    /// Sets period and repeat flag explicitly.
    pub fn periodic(mut self, period: u64, repeat: bool) -> Self {
        self.period = period;
        self.repeat = repeat;
        self
    }

    /// Sets the callback.
    pub fn callback<C: TaskCallback>(mut self, callback: C) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Sets a callback that receives mutable access to `data` on every firing.
    /// 设置回调，每次触发时可变地访问 `data`。
    pub fn with_data<D, F>(self, data: D, callback: F) -> Self
    where
        D: Send + 'static,
        F: FnMut(&mut D, &FireContext) + Send + 'static,
    {
        self.callback(ClosureCallback::new(data, callback))
    }

    /// Checks the registration and splits it for admission.
    pub(crate) fn validate(self) -> Result<(Schedule, u64, bool, Box<dyn TaskCallback>)> {
        let callback = self
            .callback
            .ok_or(Error::InvalidArgument("missing callback"))?;
        if self.repeat && self.period == 0 {
            return Err(Error::InvalidArgument(
                "repeating task requires a non-zero period",
            ));
        }
        Ok((self.schedule, self.period, self.repeat, callback))
    }
}

impl fmt::Debug for TaskRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistration")
            .field("schedule", &self.schedule)
            .field("period", &self.period)
            .field("repeat", &self.repeat)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

/// A task stored in a registry slot.
pub(crate) struct Task {
    pub(crate) expiry: u64,
    pub(crate) seq: u64,
    pub(crate) period: u64,
    pub(crate) repeat: bool,
    pub(crate) kind: TaskKind,
    pub(crate) state: TaskState,
    pub(crate) fired: u64,
    /// `None` while the callback is out being executed.
    pub(crate) callback: Option<Box<dyn TaskCallback>>,
}

impl Task {
    pub(crate) fn new(
        expiry: u64,
        period: u64,
        repeat: bool,
        kind: TaskKind,
        callback: Box<dyn TaskCallback>,
    ) -> Self {
        Self {
            expiry,
            seq: 0,
            period,
            repeat,
            kind,
            state: TaskState::Pending,
            fired: 0,
            callback: Some(callback),
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("expiry", &self.expiry)
            .field("seq", &self.seq)
            .field("period", &self.period)
            .field("repeat", &self.repeat)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("fired", &self.fired)
            .finish()
    }
}
