//! 定义了库中所有可能的错误类型。
//! Defines all possible error types in the library.

use thiserror::Error;

/// The primary error type for the timer library.
/// 定时器库的主要错误类型。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The task slot storage requested at construction could not be reserved.
    /// The timer was never created and must not be used.
    ///
    /// 构造时请求的任务槽位存储无法分配。定时器未被创建，不可使用。
    #[error("failed to allocate storage for {capacity} task slots")]
    Allocation { capacity: usize },

    /// Every task slot is occupied. The request was dropped and the pending
    /// set is unchanged; retry once a task has fired or been cancelled.
    ///
    /// 所有任务槽位均已占用。请求被丢弃，待处理集合保持不变；
    /// 可在任务触发或取消后重试。
    #[error("timer capacity of {capacity} tasks exceeded")]
    CapacityExceeded { capacity: usize },

    /// The caller supplied an argument the timer cannot accept, such as a
    /// missing callback or a repeating task with a zero period.
    ///
    /// 调用者提供了定时器无法接受的参数，例如缺少回调或周期为零的重复任务。
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The time base could not produce a trustworthy reading. The owning loop
    /// must stop driving this timer.
    ///
    /// 时间基准无法提供可信的读数。驱动该定时器的循环必须停止。
    #[error("clock failure: {0}")]
    ClockFailure(String),

    /// The timer has been shut down with `exit`.
    /// 定时器已通过 `exit` 关闭。
    #[error("timer has been shut down")]
    Shutdown,
}

impl Error {
    /// Whether the error leaves the timer unusable.
    /// 该错误是否使定时器不可再用。
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Allocation { .. } | Error::ClockFailure(_))
    }
}

/// A specialized `Result` type for this library.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        use std::io::ErrorKind;
        match err {
            Error::Allocation { .. } => ErrorKind::OutOfMemory.into(),
            Error::CapacityExceeded { .. } => ErrorKind::WouldBlock.into(),
            Error::InvalidArgument(msg) => std::io::Error::new(ErrorKind::InvalidInput, msg),
            Error::ClockFailure(reason) => std::io::Error::other(reason),
            Error::Shutdown => ErrorKind::BrokenPipe.into(),
        }
    }
}
