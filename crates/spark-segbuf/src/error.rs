//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义缓冲引擎与读写层对外暴露的错误语义；
//! - 明确区分两类截然不同的失败：**调用方缺陷**（越界、非法参数、关闭后继续使用）
//!   与**预期内的数据不足**（`EndOfData`），后者属于正常的流控分支。
//!
//! ## 设计要求（What）
//! - 所有错误通过 `thiserror::Error` 派生，兼容 `std::error::Error` 与 `?` 传播；
//! - 引擎本身从不重试、不吞错、不记录日志，错误一律同步返回给调用方决策；
//! - [`Error::category`] 提供稳定分类，调用方无需匹配字符串即可区分流控与缺陷。

use std::io;

use thiserror::Error;

/// 缓冲引擎的统一返回类型。
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// 错误分类，用于调用方在不关心细节时快速分流。
///
/// - `Fault`：调用方缺陷（越界、参数非法），应当修复调用代码而非重试；
/// - `EndOfData`：数据不足，属于可预期的流控条件；
/// - `Closed`：在已关闭的读写对象上继续操作；
/// - `Timeout`：超时或截止时间到达；
/// - `Io`：外部协作者（真实数据源/汇）返回的 I/O 失败。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorCategory {
    Fault,
    EndOfData,
    Closed,
    Timeout,
    Io,
}

/// 缓冲引擎错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：把“越界”与“读到末尾”拆成不同变体，避免调用方用异常做流控时误把缺陷当作正常结束；
/// - **契约 (What)**：
///   - `OutOfBounds`/`InvalidArgument` 为缺陷类错误，出现即说明调用方违反前置条件；
///   - `EndOfData` 携带请求量与可用量，调用方可据此决定等待更多数据或终止解析；
///   - `Closed` 仅由缓冲读写层产生；
///   - `Io` 透传外部协作者的 `std::io::Error`。
/// - **权衡 (Trade-offs)**：`InvalidArgument` 使用 `String` 保存上下文，牺牲少量分配换取可读性；
///   热路径上的越界检查使用结构化字段，不产生格式化开销。
#[derive(Debug, Error)]
pub enum Error {
    /// 偏移或长度超出有效范围。
    #[error("out of bounds: size={size} offset={offset} byte_count={byte_count}")]
    OutOfBounds {
        size: usize,
        offset: usize,
        byte_count: usize,
    },

    /// 其它前置条件不满足，例如空的搜索模式或 `from > to`。
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// 可用数据不足以满足请求。
    #[error("end of data: requested {requested} bytes, {available} available")]
    EndOfData { requested: usize, available: usize },

    /// 读写对象已关闭。
    #[error("closed")]
    Closed,

    /// 截止时间已到达。
    #[error("deadline reached")]
    DeadlineReached,

    /// 十六进制文本无法解码。
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// 外部数据源/汇返回的 I/O 错误。
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// 返回错误所属的稳定分类。
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::OutOfBounds { .. } | Error::InvalidArgument(_) | Error::InvalidHex(_) => {
                ErrorCategory::Fault
            }
            Error::EndOfData { .. } => ErrorCategory::EndOfData,
            Error::Closed => ErrorCategory::Closed,
            Error::DeadlineReached => ErrorCategory::Timeout,
            Error::Io(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                ErrorCategory::EndOfData
            }
            Error::Io(err) if err.kind() == io::ErrorKind::TimedOut => ErrorCategory::Timeout,
            Error::Io(_) => ErrorCategory::Io,
        }
    }

    /// 是否为“数据不足”这一预期内的流控条件。
    pub fn is_end_of_data(&self) -> bool {
        self.category() == ErrorCategory::EndOfData
    }

    /// 是否为调用方缺陷。
    pub fn is_fault(&self) -> bool {
        self.category() == ErrorCategory::Fault
    }

    pub(crate) fn invalid_argument(detail: impl Into<String>) -> Self {
        Error::InvalidArgument(detail.into())
    }
}

/// 校验 `[offset, offset + byte_count)` 是否落在 `[0, size)` 内。
pub(crate) fn check_offset_and_count(size: usize, offset: usize, byte_count: usize) -> Result<()> {
    if offset > size || size - offset < byte_count {
        return Err(Error::OutOfBounds {
            size,
            offset,
            byte_count,
        });
    }
    Ok(())
}

impl From<Error> for io::Error {
    /// 供 `std::io` 桥接实现使用：保持类别语义，数据不足映射为 `UnexpectedEof`。
    fn from(value: Error) -> Self {
        match value {
            Error::Io(err) => err,
            Error::EndOfData { .. } => io::Error::new(io::ErrorKind::UnexpectedEof, value),
            Error::OutOfBounds { .. } | Error::InvalidArgument(_) | Error::InvalidHex(_) => {
                io::Error::new(io::ErrorKind::InvalidInput, value)
            }
            Error::Closed => io::Error::new(io::ErrorKind::BrokenPipe, value),
            Error::DeadlineReached => io::Error::new(io::ErrorKind::TimedOut, value),
        }
    }
}
