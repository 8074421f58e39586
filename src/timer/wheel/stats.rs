//! 时间轮统计信息
//! Timing wheel statistics

/// 时间轮统计信息
/// Timing wheel statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingWheelStats {
    /// 总槽位数
    /// Total number of slots
    pub total_slots: usize,
    /// 非空槽位数
    /// Number of non-empty slots
    pub non_empty_slots: usize,
    /// 时间轮中的任务数
    /// Number of tasks held by the wheel
    pub total_timers: usize,
    /// 最大槽位大小
    /// Maximum slot size
    pub max_slot_size: usize,
    /// 下一个待推进的滴答
    /// Next tick to be advanced
    pub current_tick: u64,
}

impl std::fmt::Display for TimingWheelStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TimingWheelStats {{ slots: {}/{}, timers: {}, max_slot: {}, tick: {} }}",
            self.non_empty_slots,
            self.total_slots,
            self.total_timers,
            self.max_slot_size,
            self.current_tick
        )
    }
}
