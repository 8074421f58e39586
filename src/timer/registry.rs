//! 待处理任务注册表
//! Pending task registry
//!
//! 注册表按 `(到期时间, 插入序号)` 排序保存所有任务。任务本身存放在固定容量的
//! 带代数槽位数组中；排序结构（带位置索引的最小堆，以及粗粒度模式下的时间轮）
//! 只保存排序键和槽位索引。
//!
//! The registry keeps every task ordered by `(expiry, insertion sequence)`. Tasks
//! live in a fixed-capacity generational slot array; the ordering structures
//! (an index-tracked min-heap, plus a timing wheel in coarse mode) only hold
//! ordering keys and slot indices.

mod heap;
mod slots;


use crate::error::{Error, Result};
use crate::timer::task::{Task, TaskCallback, TaskHandle, TaskKind, TaskState};
use crate::timer::wheel::{TimingWheel, TimingWheelStats};
use tracing::trace;

use heap::TaskHeap;
use slots::SlotArena;

/// 排序键：先按到期时间，再按插入序号（相同到期时间先进先出）
/// Ordering key: expiry first, then insertion sequence (FIFO among equal expiries)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct TaskKey {
    pub(crate) expiry: u64,
    pub(crate) seq: u64,
    pub(crate) slot: u32,
}

/// 从注册表中取出、等待执行回调的到期任务
/// A due task taken out of the registry, waiting for its callback to run
pub(crate) struct DueTask {
    pub(crate) handle: TaskHandle,
    pub(crate) kind: TaskKind,
    pub(crate) expiry: u64,
    pub(crate) firing: u64,
    pub(crate) callback: Box<dyn TaskCallback>,
}

/// 一次触发结束后的去向
/// What became of a task once its firing completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Completion {
    /// 重新进入等待，新的到期时间
    /// Back to pending with a new expiry
    Rescheduled(u64),
    /// 槽位已释放
    /// Slot released
    Released,
}

#[derive(Debug)]
pub(crate) struct Registry {
    owner: u64,
    tasks: SlotArena<Task>,
    heap: TaskHeap,
    wheel: Option<TimingWheel>,
    next_seq: u64,
}

impl Registry {
    /// 创建注册表；`wheel` 为 `(槽位数, 起始滴答)` 时启用时间轮
    /// Create a registry; `wheel = Some((slots, start_tick))` enables the timing wheel
    pub(crate) fn new(owner: u64, capacity: usize, wheel: Option<(usize, u64)>) -> Result<Self> {
        let tasks = SlotArena::try_with_capacity(capacity)?;
        let heap = TaskHeap::try_with_capacity(capacity)?;
        let wheel = match wheel {
            Some((slot_count, start_tick)) => {
                Some(TimingWheel::new(slot_count, capacity, start_tick)?)
            }
            None => None,
        };
        Ok(Self {
            owner,
            tasks,
            heap,
            wheel,
            next_seq: 0,
        })
    }

    pub(crate) fn capacity(&self) -> usize {
        self.tasks.capacity()
    }

    /// 已占用的槽位数（包括正在触发的任务）
    /// Occupied slots, including tasks that are currently firing
    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    /// 等待到期的任务数
    /// Tasks waiting for their expiry
    pub(crate) fn pending(&self) -> usize {
        self.heap.len() + self.wheel.as_ref().map_or(0, TimingWheel::len)
    }

    pub(crate) fn wheel_stats(&self) -> Option<TimingWheelStats> {
        self.wheel.as_ref().map(TimingWheel::stats)
    }

    /// 插入任务，已满时返回 `CapacityExceeded` 且不修改注册表
    /// Insert a task; `CapacityExceeded` leaves the registry untouched
    pub(crate) fn insert(&mut self, mut task: Task) -> Result<TaskHandle> {
        if self.tasks.is_full() {
            return Err(Error::CapacityExceeded {
                capacity: self.capacity(),
            });
        }

        let expiry = task.expiry;
        let seq = self.next_seq();
        task.seq = seq;
        task.state = TaskState::Pending;

        let (index, generation) = self.tasks.insert(task).ok_or(Error::CapacityExceeded {
            capacity: self.tasks.capacity(),
        })?;
        self.place(TaskKey {
            expiry,
            seq,
            slot: index,
        });

        trace!(index, generation, expiry, seq, "Task inserted");
        Ok(TaskHandle::new(self.owner, index, generation))
    }

    /// 取消任务
    /// Cancel a task
    ///
    /// Returns `true` when this call prevented a future firing: a pending task
    /// is released immediately, a repeating task that is currently firing is
    /// marked cancelled and released once the firing completes. Stale handles,
    /// handles of other timers and one-shots that are already firing yield
    /// `false`.
    pub(crate) fn remove(&mut self, handle: TaskHandle) -> bool {
        if handle.owner != self.owner {
            return false;
        }
        let Some(task) = self.tasks.get_mut(handle.index, handle.generation) else {
            return false;
        };

        match task.state {
            TaskState::Pending => {
                self.unlink(handle.index);
                self.tasks.remove(handle.index, handle.generation);
                trace!(?handle, "Pending task removed");
                true
            }
            TaskState::Firing => {
                task.state = TaskState::Cancelled;
                trace!(?handle, repeat = task.repeat, "Firing task marked cancelled");
                task.repeat
            }
            TaskState::Cancelled => false,
        }
    }

    pub(crate) fn state(&self, handle: TaskHandle) -> Option<TaskState> {
        if handle.owner != self.owner {
            return None;
        }
        self.tasks
            .get(handle.index, handle.generation)
            .map(|task| task.state)
    }

    /// 最早的到期时间
    /// Earliest pending expiry
    pub(crate) fn peek_min(&mut self) -> Option<u64> {
        let heap_min = self.heap.peek().map(|key| key.expiry);
        let wheel_min = self.wheel.as_mut().and_then(TimingWheel::next_expiry_time);
        match (heap_min, wheel_min) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// 取出所有 `expiry <= now` 的任务，按 `(到期时间, 序号)` 排序并标记为触发中
    /// Take out every task with `expiry <= now`, ordered by `(expiry, seq)` and
    /// marked as firing
    pub(crate) fn extract_all_due(&mut self, now: u64) -> Vec<DueTask> {
        let mut keys = Vec::new();
        if let Some(wheel) = self.wheel.as_mut() {
            wheel.advance(now, &mut keys);
        }
        self.heap.pop_due(now, &mut keys);
        if keys.is_empty() {
            return Vec::new();
        }
        keys.sort_unstable();

        let mut due = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(generation) = self.tasks.generation(key.slot) else {
                continue;
            };
            let Some(task) = self.tasks.get_by_index_mut(key.slot) else {
                continue;
            };
            let Some(callback) = task.callback.take() else {
                continue;
            };
            task.state = TaskState::Firing;
            due.push(DueTask {
                handle: TaskHandle::new(self.owner, key.slot, generation),
                kind: task.kind,
                expiry: task.expiry,
                firing: task.fired + 1,
                callback,
            });
        }
        due
    }

    /// 触发结束：一次性或已取消的任务被释放，重复任务以 `now + period` 重新插入
    /// Firing done: one-shot or cancelled tasks are released, repeating tasks
    /// re-enter at `now + period`
    pub(crate) fn complete(&mut self, due: DueTask, now: u64) -> Completion {
        let handle = due.handle;
        let Some(task) = self.tasks.get_mut(handle.index, handle.generation) else {
            return Completion::Released;
        };
        task.fired += 1;

        if task.state == TaskState::Cancelled || !task.repeat {
            self.tasks.remove(handle.index, handle.generation);
            return Completion::Released;
        }

        let expiry = now.saturating_add(task.period);
        let seq = self.next_seq;
        self.next_seq += 1;
        task.expiry = expiry;
        task.seq = seq;
        task.state = TaskState::Pending;
        task.callback = Some(due.callback);
        self.place(TaskKey {
            expiry,
            seq,
            slot: handle.index,
        });

        trace!(?handle, expiry, "Repeating task rescheduled");
        Completion::Rescheduled(expiry)
    }

    /// 释放一个已取出的任务，不论其是否重复
    /// Release a taken-out task regardless of repeat
    pub(crate) fn release(&mut self, due: DueTask) {
        self.tasks.remove(due.handle.index, due.handle.generation);
    }

    /// 把尚未执行的到期任务放回等待状态，保持原有顺序
    /// Put due tasks that never ran back to pending, keeping their order
    pub(crate) fn restore(&mut self, due: DueTask) {
        let handle = due.handle;
        let Some(task) = self.tasks.get_mut(handle.index, handle.generation) else {
            return;
        };
        if task.state == TaskState::Cancelled {
            self.tasks.remove(handle.index, handle.generation);
            return;
        }
        task.state = TaskState::Pending;
        task.callback = Some(due.callback);
        let key = TaskKey {
            expiry: task.expiry,
            seq: task.seq,
            slot: handle.index,
        };
        self.place(key);
    }

    /// 丢弃所有任务，不执行回调
    /// Drop every task without running callbacks
    pub(crate) fn clear(&mut self) -> usize {
        self.heap.clear();
        if let Some(wheel) = self.wheel.as_mut() {
            wheel.clear();
        }
        self.tasks.clear()
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn place(&mut self, key: TaskKey) {
        let key = match self.wheel.as_mut() {
            Some(wheel) => match wheel.insert(key) {
                Ok(()) => return,
                Err(key) => key,
            },
            None => key,
        };
        self.heap.push(key);
    }

    fn unlink(&mut self, slot: u32) {
        if self.heap.contains(slot) {
            self.heap.remove(slot);
        } else if let Some(wheel) = self.wheel.as_mut() {
            wheel.remove(slot);
        }
    }
}
