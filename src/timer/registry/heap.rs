//! 带位置索引的二叉最小堆
//! Index-tracked binary min-heap
//!
//! 每个槽位在堆中的位置都被记录下来，因此可以在 O(log n) 内删除任意任务，
//! 而不仅仅是堆顶。
//!
//! The heap position of every slot is recorded, so an arbitrary task can be
//! removed in O(log n), not just the minimum.

use crate::error::{Error, Result};

use super::TaskKey;

#[derive(Debug)]
pub(crate) struct TaskHeap {
    entries: Vec<TaskKey>,
    /// 槽位索引 -> 堆中位置
    /// Slot index -> position in `entries`
    positions: Vec<Option<usize>>,
}

impl TaskHeap {
    pub(crate) fn try_with_capacity(capacity: usize) -> Result<Self> {
        let mut entries = Vec::new();
        entries
            .try_reserve_exact(capacity)
            .map_err(|_| Error::Allocation { capacity })?;
        let mut positions = Vec::new();
        positions
            .try_reserve_exact(capacity)
            .map_err(|_| Error::Allocation { capacity })?;
        positions.resize(capacity, None);
        Ok(Self { entries, positions })
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn peek(&self) -> Option<&TaskKey> {
        self.entries.first()
    }

    pub(crate) fn contains(&self, slot: u32) -> bool {
        matches!(self.positions.get(slot as usize), Some(Some(_)))
    }

    pub(crate) fn push(&mut self, key: TaskKey) {
        let pos = self.entries.len();
        self.positions[key.slot as usize] = Some(pos);
        self.entries.push(key);
        self.sift_up(pos);
    }

    /// 删除指定槽位的任务
    /// Remove the task occupying `slot`
    pub(crate) fn remove(&mut self, slot: u32) -> Option<TaskKey> {
        let pos = self.positions.get_mut(slot as usize)?.take()?;
        let last = self.entries.len() - 1;
        if pos != last {
            self.entries.swap(pos, last);
            self.positions[self.entries[pos].slot as usize] = Some(pos);
        }
        let removed = self.entries.pop();
        if pos < self.entries.len() {
            // 被换入的元素可能需要上浮或下沉
            // The element swapped in may need to move either way
            self.sift_down(pos);
            self.sift_up(pos);
        }
        removed
    }

    /// 弹出所有 `expiry <= now` 的任务，按出堆顺序追加到 `out`
    /// Pop every task with `expiry <= now`, appending to `out` in pop order
    pub(crate) fn pop_due(&mut self, now: u64, out: &mut Vec<TaskKey>) {
        while let Some(top) = self.entries.first() {
            if top.expiry > now {
                break;
            }
            let slot = top.slot;
            if let Some(key) = self.remove(slot) {
                out.push(key);
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        for key in self.entries.drain(..) {
            self.positions[key.slot as usize] = None;
        }
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.entries[pos] >= self.entries[parent] {
                break;
            }
            self.swap(pos, parent);
            pos = parent;
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.entries.len();
        loop {
            let left = 2 * pos + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let child = if right < len && self.entries[right] < self.entries[left] {
                right
            } else {
                left
            };
            if self.entries[pos] <= self.entries[child] {
                break;
            }
            self.swap(pos, child);
            pos = child;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.entries.swap(a, b);
        self.positions[self.entries[a].slot as usize] = Some(a);
        self.positions[self.entries[b].slot as usize] = Some(b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(expiry: u64, seq: u64, slot: u32) -> TaskKey {
        TaskKey { expiry, seq, slot }
    }

    #[test]
    fn test_pop_due_is_ordered() {
        let mut heap = TaskHeap::try_with_capacity(8).unwrap();
        heap.push(key(30, 0, 0));
        heap.push(key(10, 1, 1));
        heap.push(key(20, 2, 2));
        heap.push(key(10, 3, 3));
        heap.push(key(50, 4, 4));

        let mut due = Vec::new();
        heap.pop_due(30, &mut due);
        let slots: Vec<u32> = due.iter().map(|k| k.slot).collect();
        assert_eq!(slots, vec![1, 3, 2, 0]);
        assert_eq!(heap.len(), 1);
        assert_eq!(heap.peek().map(|k| k.expiry), Some(50));
    }

    #[test]
    fn test_remove_arbitrary_keeps_heap_valid() {
        let mut heap = TaskHeap::try_with_capacity(16).unwrap();
        for slot in 0..10u32 {
            heap.push(key(u64::from(100 - slot * 7), u64::from(slot), slot));
        }
        assert_eq!(heap.remove(4).map(|k| k.slot), Some(4));
        assert_eq!(heap.remove(9).map(|k| k.slot), Some(9));
        assert!(heap.remove(4).is_none());
        assert!(!heap.contains(4));

        let mut due = Vec::new();
        heap.pop_due(u64::MAX, &mut due);
        assert_eq!(due.len(), 8);
        assert!(due.windows(2).all(|w| w[0] <= w[1]));
        assert!(heap.is_empty());
    }

    #[test]
    fn test_nothing_due_before_expiry() {
        let mut heap = TaskHeap::try_with_capacity(2).unwrap();
        heap.push(key(5, 0, 1));
        let mut due = Vec::new();
        heap.pop_due(4, &mut due);
        assert!(due.is_empty());
        assert!(heap.contains(1));
    }
}
