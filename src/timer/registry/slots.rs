//! 固定容量的带代数槽位数组
//! Fixed-capacity generational slot array

use crate::error::{Error, Result};

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// 固定容量的槽位数组，所有存储在构造时一次性分配
/// Fixed-capacity slot array; all storage is reserved once at construction
#[derive(Debug)]
pub(crate) struct SlotArena<T> {
    slots: Vec<Slot<T>>,
    /// 空闲槽位栈，栈顶为下一个分配的槽位
    /// Free slot stack, the top is allocated next
    free: Vec<u32>,
}

impl<T> SlotArena<T> {
    /// 预留 `capacity` 个槽位，分配失败时返回 `Error::Allocation`
    /// Reserve `capacity` slots, returning `Error::Allocation` if that fails
    pub(crate) fn try_with_capacity(capacity: usize) -> Result<Self> {
        let alloc_error = || Error::Allocation { capacity };
        let top = u32::try_from(capacity).map_err(|_| alloc_error())?;

        let mut slots = Vec::new();
        slots.try_reserve_exact(capacity).map_err(|_| alloc_error())?;
        let mut free = Vec::new();
        free.try_reserve_exact(capacity).map_err(|_| alloc_error())?;

        slots.extend((0..capacity).map(|_| Slot {
            generation: 0,
            value: None,
        }));
        // 逆序入栈，使槽位0最先被分配
        free.extend((0..top).rev());

        Ok(Self { slots, free })
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    /// 插入值，返回 (索引, 代数)；已满时返回 None
    /// Insert a value, returning (index, generation); None when full
    pub(crate) fn insert(&mut self, value: T) -> Option<(u32, u32)> {
        let index = self.free.pop()?;
        let slot = &mut self.slots[index as usize];
        debug_assert!(slot.value.is_none(), "free list handed out an occupied slot");
        slot.value = Some(value);
        Some((index, slot.generation))
    }

    pub(crate) fn generation(&self, index: u32) -> Option<u32> {
        self.slots.get(index as usize).map(|slot| slot.generation)
    }

    pub(crate) fn get(&self, index: u32, generation: u32) -> Option<&T> {
        self.slots
            .get(index as usize)
            .filter(|slot| slot.generation == generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub(crate) fn get_mut(&mut self, index: u32, generation: u32) -> Option<&mut T> {
        self.slots
            .get_mut(index as usize)
            .filter(|slot| slot.generation == generation)
            .and_then(|slot| slot.value.as_mut())
    }

    /// 按索引访问，不检查代数（仅供持有索引的内部结构使用）
    /// Index-only access for internal structures that track live indices
    pub(crate) fn get_by_index_mut(&mut self, index: u32) -> Option<&mut T> {
        self.slots
            .get_mut(index as usize)
            .and_then(|slot| slot.value.as_mut())
    }

    /// 释放槽位并递增代数，使所有旧句柄失效
    /// Release a slot and bump its generation, invalidating old handles
    pub(crate) fn remove(&mut self, index: u32, generation: u32) -> Option<T> {
        let slot = self
            .slots
            .get_mut(index as usize)
            .filter(|slot| slot.generation == generation)?;
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        Some(value)
    }

    /// 释放所有槽位，返回被丢弃的值的数量
    /// Release every slot, returning how many values were dropped
    pub(crate) fn clear(&mut self) -> usize {
        let mut dropped = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.value.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                dropped += 1;
            }
        }
        dropped
    }
}
