//! 定时器任务句柄
//! Timer task handle
//!
//! 句柄是指向任务槽位数组的带代数标签的索引。槽位被释放时代数递增，
//! 因此过期句柄可以通过代数不匹配被检测出来，而不会访问已被重用的槽位。
//!
//! A handle is a generation-tagged index into the task slot array. Releasing a
//! slot bumps its generation, so a stale handle is detected by the mismatch
//! instead of touching a slot that has since been reused.

use std::fmt;

/// 定时器任务句柄，用于取消任务
/// Timer task handle for cancelling tasks
///
/// Handles are plain values: they can be copied, compared, stored and
/// dropped freely. Dropping one does not cancel the task.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    /// 创建该句柄的定时器实例
    /// Timer instance that issued the handle
    pub(crate) owner: u64,
    /// 槽位索引
    /// Slot index
    pub(crate) index: u32,
    /// 槽位代数
    /// Slot generation
    pub(crate) generation: u32,
}

impl TaskHandle {
    pub(crate) fn new(owner: u64, index: u32, generation: u32) -> Self {
        Self {
            owner,
            index,
            generation,
        }
    }

    /// The slot index this handle points at.
    /// 句柄指向的槽位索引。
    pub fn index(&self) -> u32 {
        self.index
    }

    /// The generation the slot had when the task was admitted.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TaskHandle({}:{}v{})",
            self.owner, self.index, self.generation
        )
    }
}
