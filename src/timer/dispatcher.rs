//! 到期任务分发
//! Due task dispatch
//!
//! `timeout` 告诉调用者下一次需要在多久之后调用 `spak`；`spak` 执行一次分发：
//! 读取当前时间，取出所有到期任务，按 `(到期时间, 提交顺序)` 逐个执行回调。
//! `run_loop` / `start_timer_loop` 把两者组合成一个 tokio 驱动的分发循环。
//!
//! `timeout` tells the caller how long until `spak` must be called again;
//! `spak` performs one dispatch pass: read now, take out every due task and
//! run the callbacks in `(expiry, admission)` order. `run_loop` and
//! `start_timer_loop` combine the two into a tokio driven dispatch loop.

use crate::error::{Error, Result};
use crate::timer::clock::{TickDriver, TimeBase};
use crate::timer::engine::Timer;
use crate::timer::registry::Completion;
use crate::timer::task::{FireContext, TaskKind};
use std::collections::VecDeque;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

impl Timer {
    /// 距离最早任务到期还有多少时间单位
    /// Time units until the earliest pending task is due
    ///
    /// `None` means nothing is pending. `Some(0)` means a task is already due,
    /// and is also returned when the time base cannot be read so the caller
    /// calls `spak` and observes the failure there.
    pub fn timeout(&self) -> Option<u64> {
        let earliest = self.shared.state.lock().registry.peek_min()?;
        match self.shared.clock.now() {
            Ok(now) => Some(earliest.saturating_sub(now)),
            Err(err) => {
                warn!(timer_id = self.shared.id, %err, "Time base read failed while computing timeout");
                Some(0)
            }
        }
    }

    /// 以 `Duration` 表示的 `timeout`
    /// `timeout` expressed as a `Duration`
    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout()
            .map(|units| self.shared.clock.to_duration(units))
    }

    /// 执行一次分发
    /// Run one dispatch pass
    ///
    /// Returns `Ok(true)` when at least one callback ran. Tasks that become due
    /// while callbacks are running, including tasks admitted by those
    /// callbacks, wait for the next pass.
    ///
    /// # Panics
    /// A panicking callback is propagated after its own task is released and
    /// the remaining due tasks of this pass are put back to pending, so a
    /// later pass fires them.
    pub fn spak(&self) -> Result<bool> {
        self.dispatch(true)
    }

    pub(crate) fn dispatch(&self, notify_reschedule: bool) -> Result<bool> {
        let now = self.shared.clock.now().inspect_err(|err| {
            warn!(timer_id = self.shared.id, %err, "Time base read failed, dispatch skipped");
        })?;

        let due = self.shared.state.lock().registry.extract_all_due(now);
        if due.is_empty() {
            return Ok(false);
        }

        let total = due.len();
        let mut rescheduled = 0usize;
        let mut due = VecDeque::from(due);
        while let Some(mut task) = due.pop_front() {
            let ctx = FireContext {
                handle: (task.kind == TaskKind::Add).then_some(task.handle),
                now,
                expiry: task.expiry,
                firing: task.firing,
            };
            trace!(handle = ?task.handle, expiry = task.expiry, now, "Firing task");

            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| task.callback.on_expired(&ctx)));

            let mut state = self.shared.state.lock();
            if let Err(payload) = outcome {
                warn!(
                    timer_id = self.shared.id,
                    handle = ?task.handle,
                    remaining = due.len(),
                    "Task callback panicked, remaining due tasks restored"
                );
                state.registry.release(task);
                for rest in due.drain(..) {
                    state.registry.restore(rest);
                }
                drop(state);
                panic::resume_unwind(payload);
            }

            state.counters.fired += 1;
            if let Completion::Rescheduled(_) = state.registry.complete(task, now) {
                state.counters.rescheduled += 1;
                rescheduled += 1;
            }
        }

        // 由外部线程分发时，重新调度的任务可能早于循环当前的休眠目标
        // When dispatched from outside the loop a rescheduled task may be due
        // before the loop's current sleep target
        if notify_reschedule && rescheduled > 0 {
            self.shared.wakeup.notify_one();
        }

        debug!(timer_id = self.shared.id, now, fired = total, rescheduled, "Dispatch pass completed");
        Ok(true)
    }

    /// 运行分发循环，直到 `shutdown` 完成或定时器被关闭
    /// Run the dispatch loop until `shutdown` resolves or the timer is shut down
    ///
    /// The loop sleeps for `timeout_duration` and wakes early when a task
    /// admitted from elsewhere becomes the earliest one. A time base failure
    /// ends the loop with that error.
    ///
    /// With the built-in coarse clock the loop also advances the tick counter
    /// by the ticks that elapsed before every pass, so no separate ticker is
    /// needed.
    pub async fn run_loop<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(timer_id = self.shared.id, "Timer loop started");
        tokio::pin!(shutdown);
        let mut ticks = self.shared.clock.as_coarse().cloned().map(TickDriver::new);

        let result = loop {
            if self.is_closed() {
                break Ok(());
            }
            if let Some(driver) = ticks.as_mut() {
                driver.refresh();
            }
            if let Err(err) = self.dispatch(false) {
                break Err(err);
            }

            // 先注册通知再计算超时，避免错过两者之间提交的任务
            // Register for notification before computing the timeout so an
            // admission in between is not missed
            let notified = self.shared.wakeup.notified();
            let wait = self.timeout_duration();

            tokio::select! {
                _ = &mut shutdown => break Ok(()),
                _ = notified => {}
                _ = sleep_for(wait) => {}
            }
        };

        match &result {
            Ok(()) => info!(timer_id = self.shared.id, "Timer loop stopped"),
            Err(err) => warn!(timer_id = self.shared.id, %err, "Timer loop stopped on error"),
        }
        result
    }
}

async fn sleep_for(wait: Option<Duration>) {
    match wait {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

/// 分发循环句柄
/// Dispatch loop handle
///
/// Dropping the handle without calling `shutdown` also stops the loop.
#[derive(Debug)]
pub struct TimerLoopHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: JoinHandle<Result<()>>,
}

impl TimerLoopHandle {
    /// 停止分发循环并等待其退出
    /// Stop the dispatch loop and wait for it to exit
    ///
    /// A panic raised by a callback inside the loop is resumed here.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        match (&mut self.join).await {
            Ok(result) => result,
            Err(err) if err.is_panic() => panic::resume_unwind(err.into_panic()),
            Err(_) => Err(Error::Shutdown),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// 在当前 tokio 运行时上启动分发循环
/// Spawn the dispatch loop on the current tokio runtime
pub fn start_timer_loop(timer: Timer) -> TimerLoopHandle {
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let join = tokio::spawn(async move {
        timer
            .run_loop(async {
                let _ = shutdown_rx.await;
            })
            .await
    });
    TimerLoopHandle {
        shutdown_tx: Some(shutdown_tx),
        join,
    }
}
