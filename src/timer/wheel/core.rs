//! 时间轮核心实现
//! Timing wheel core implementation

use crate::error::{Error, Result};
use crate::timer::registry::TaskKey;
use crate::timer::wheel::stats::TimingWheelStats;
use tracing::trace;

/// 时间轮实现
/// Timing wheel implementation
///
/// 每个槽位对应一个滴答。时间轮只接收到期时间位于
/// `[current_tick, current_tick + slot_count)` 之内的任务，因此每个槽位中的
/// 任务到期时间都相同。超出范围的任务由调用者放入堆中。
///
/// One slot per tick. The wheel only accepts tasks whose expiry lies in
/// `[current_tick, current_tick + slot_count)`, so every entry of a slot shares
/// the same expiry. Tasks outside that window are left to the caller's heap.
#[derive(Debug)]
pub(crate) struct TimingWheel {
    /// 时间轮的槽位数量（必须是2的幂以支持位运算优化）
    /// Number of slots in the timing wheel (must be power of 2 for bitwise optimization)
    pub(super) slot_count: usize,
    /// 槽位数量的掩码，用于快速模运算 (slot_count - 1)
    /// Slot count mask for fast modulo operation (slot_count - 1)
    pub(super) slot_mask: u64,
    /// 下一个尚未推进的滴答
    /// The next tick that has not been advanced past
    pub(super) current_tick: u64,
    /// 槽位数组，每个槽位包含该滴答到期的任务
    /// Slot array, each slot contains tasks that expire at that tick
    pub(super) slots: Vec<Vec<TaskKey>>,
    /// 任务槽位索引 -> (时间轮槽位, 槽位内位置)，用于快速删除
    /// Task slot index -> (wheel slot, position in slot) for fast deletion
    pub(super) positions: Vec<Option<(usize, usize)>>,
    /// 时间轮中的任务总数
    /// Total number of tasks in the wheel
    pub(super) len: usize,
    /// 缓存的下次到期时间，`None` 表示未知或为空
    /// Cached next expiry, `None` means unknown or empty
    pub(super) cached_next_expiry: Option<u64>,
}

impl TimingWheel {
    /// 创建新的时间轮
    /// Create new timing wheel
    ///
    /// # Arguments
    /// * `slot_count` - 槽位数量，必须是2的幂次方以优化取模运算
    /// * `capacity` - 可能出现的最大任务槽位索引数
    /// * `start_tick` - 起始滴答
    ///
    /// # Arguments (English)
    /// * `slot_count` - Number of slots, must be power of 2 for optimized modulo
    /// * `capacity` - Number of task slot indices that may be stored
    /// * `start_tick` - Tick the wheel starts at
    pub fn new(slot_count: usize, capacity: usize, start_tick: u64) -> Result<Self> {
        if !slot_count.is_power_of_two() {
            return Err(Error::InvalidArgument("wheel_slots must be a power of 2"));
        }

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(slot_count)
            .map_err(|_| Error::Allocation { capacity })?;
        slots.resize_with(slot_count, Vec::new);

        let mut positions = Vec::new();
        positions
            .try_reserve_exact(capacity)
            .map_err(|_| Error::Allocation { capacity })?;
        positions.resize(capacity, None);

        Ok(Self {
            slot_count,
            slot_mask: slot_count as u64 - 1,
            current_tick: start_tick,
            slots,
            positions,
            len: 0,
            cached_next_expiry: None,
        })
    }

    /// 时间轮中的任务数量
    /// Number of tasks in the wheel
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 到期时间是否落在时间轮的覆盖范围内
    /// Whether the expiry falls within the wheel's horizon
    pub fn accepts(&self, expiry: u64) -> bool {
        expiry >= self.current_tick && expiry - self.current_tick < self.slot_count as u64
    }

    #[inline]
    fn slot_index(&self, tick: u64) -> usize {
        (tick & self.slot_mask) as usize
    }

    /// 添加任务到时间轮，超出覆盖范围时原样返回
    /// Add a task to the wheel, handing it back if outside the horizon
    pub fn insert(&mut self, key: TaskKey) -> std::result::Result<(), TaskKey> {
        if !self.accepts(key.expiry) {
            return Err(key);
        }

        let slot_index = self.slot_index(key.expiry);
        let position_in_slot = self.slots[slot_index].len();
        self.positions[key.slot as usize] = Some((slot_index, position_in_slot));
        self.slots[slot_index].push(key);

        // 更新缓存的下次到期时间
        // Update cached next expiry time
        if self.len == 0 {
            self.cached_next_expiry = Some(key.expiry);
        } else if let Some(current_earliest) = self.cached_next_expiry {
            if key.expiry < current_earliest {
                self.cached_next_expiry = Some(key.expiry);
            }
        }
        self.len += 1;

        trace!(
            slot = key.slot,
            slot_index,
            expiry = key.expiry,
            "Added task to timing wheel"
        );
        Ok(())
    }

    /// 删除指定任务槽位的任务
    /// Remove the task stored for a task slot
    pub fn remove(&mut self, slot: u32) -> Option<TaskKey> {
        let (slot_index, position_in_slot) = self.positions.get_mut(slot as usize)?.take()?;
        let bucket = &mut self.slots[slot_index];

        // 与最后一个元素交换后弹出；槽位内顺序无关紧要，调用者会按 (到期时间, 序号) 排序
        // Swap with the last element and pop; order within a slot is irrelevant,
        // callers sort by (expiry, seq)
        let removed = bucket.swap_remove(position_in_slot);
        if let Some(swapped_entry) = bucket.get(position_in_slot) {
            self.positions[swapped_entry.slot as usize] = Some((slot_index, position_in_slot));
        }
        self.len -= 1;

        // 只有当被删除的任务可能是最早的时才清除缓存
        // Only clear the cache if the removed task may have been the earliest
        if self.cached_next_expiry == Some(removed.expiry) {
            self.cached_next_expiry = None;
        }

        trace!(slot, expiry = removed.expiry, "Removed task from timing wheel");
        Some(removed)
    }

    /// 推进时间轮到 `now`，把所有到期任务追加到 `out`
    /// Advance the wheel to `now`, appending every due task to `out`
    pub fn advance(&mut self, now: u64, out: &mut Vec<TaskKey>) {
        if now < self.current_tick {
            return;
        }

        let span = now - self.current_tick + 1;
        let before = out.len();
        if span >= self.slot_count as u64 {
            // 推进跨度超过一整圈，所有槽位都已到期
            // Advanced past a full revolution, every slot is due
            for slot_index in 0..self.slot_count {
                self.drain_slot(slot_index, out);
            }
        } else {
            for tick in self.current_tick..=now {
                let slot_index = self.slot_index(tick);
                self.drain_slot(slot_index, out);
            }
        }
        self.current_tick = now.saturating_add(1);

        if let Some(cached) = self.cached_next_expiry {
            if cached <= now {
                self.cached_next_expiry = None;
            }
        }

        let expired = out.len() - before;
        if expired > 0 {
            trace!(now, expired, "Advanced timing wheel");
        }
    }

    fn drain_slot(&mut self, slot_index: usize, out: &mut Vec<TaskKey>) {
        for key in self.slots[slot_index].drain(..) {
            self.positions[key.slot as usize] = None;
            self.len -= 1;
            out.push(key);
        }
    }

    /// 获取下一个到期时间
    /// Get the next expiry time
    pub fn next_expiry_time(&mut self) -> Option<u64> {
        if self.is_empty() {
            return None;
        }
        if let Some(cached) = self.cached_next_expiry {
            return Some(cached);
        }

        let next = (0..self.slot_count as u64)
            .map(|offset| self.current_tick + offset)
            .find(|&tick| !self.slots[self.slot_index(tick)].is_empty());
        self.cached_next_expiry = next;
        next
    }

    /// 清空时间轮
    /// Clear the timing wheel
    pub fn clear(&mut self) {
        for bucket in &mut self.slots {
            for key in bucket.drain(..) {
                self.positions[key.slot as usize] = None;
            }
        }
        self.len = 0;
        self.cached_next_expiry = None;
    }

    /// 获取时间轮统计信息
    /// Get timing wheel statistics
    pub fn stats(&self) -> TimingWheelStats {
        let non_empty_slots = self.slots.iter().filter(|s| !s.is_empty()).count();
        let max_slot_size = self.slots.iter().map(Vec::len).max().unwrap_or(0);

        TimingWheelStats {
            total_slots: self.slot_count,
            non_empty_slots,
            total_timers: self.len,
            max_slot_size,
            current_tick: self.current_tick,
        }
    }
}
