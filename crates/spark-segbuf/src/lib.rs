//! `spark-segbuf` 提供基于分段池的字节缓冲引擎与缓冲式读写层。
//!
//! # 模块定位（Why）
//! - 为协议编解码、文件与网络 I/O 提供统一的字节容器：从尾部写入、从头部读取，
//!   并在缓冲之间以“转移分段所有权”代替复制，使大块数据的搬运成本与数据量无关；
//! - 在 `std::io` 之外补齐“缓冲到缓冲”的 [`Source`]/[`Sink`] 契约，
//!   让解析器可以按字节、按行、按定长字段读取，而底层只看到整段的批量读写。
//!
//! # 设计概要（How）
//! - `segment` 模块定义固定 [`SEGMENT_SIZE`] 字节的分段与索引式环形链表；
//!   存储以 `Arc` 持有，共享即只读，写入前必须独占；
//! - `pool` 模块实现有界自由链表 [`SegmentPool`]，分段读空后回收复用；
//! - `buffer` 模块实现核心引擎 [`Buffer`]：读写、转移、查找、快照与 `std::io` 桥接；
//! - `byte_string` 模块提供不可变字节串 [`ByteString`]，承载快照、搜索模式与摘要；
//! - `io` 与 `buffered` 模块定义读写契约及其缓冲包装 [`BufferedSource`]/[`BufferedSink`]。
//!
//! # 错误约定（What）
//! - 越界与非法参数属于调用方缺陷，数据不足属于预期内的流控分支，二者由
//!   [`Error::category`] 明确区分；
//! - 引擎只在池丢弃分段等低频路径输出 `tracing` 事件，不会在热路径上记录日志。
//!
//! # 命名约定（Consistency）
//! - 长度与计数一律使用 `usize`，命名为 `byte_count`；偏移命名为 `offset`/`from`/`to`；
//! - 可能因数据不足而失败的读取返回 `Result`，纯查询（如 [`Buffer::index_of`]）返回 `Option`。

mod buffer;
mod buffered;
mod byte_string;
mod error;
mod io;
mod pool;
mod segment;
pub mod utf8;

pub use buffer::Buffer;
pub use buffered::{BufferedSink, BufferedSource};
pub use byte_string::ByteString;
pub use error::{Error, ErrorCategory, Result};
pub use io::{Blackhole, ReaderSource, Sink, Source, Timeout, WriterSink, blackhole};
pub use pool::{DEFAULT_POOL_MAX_BYTES, PoolConfig, PoolStats, SegmentPool};
pub use segment::{SEGMENT_SIZE, SHARE_MINIMUM};
