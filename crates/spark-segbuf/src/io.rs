//! # io 模块说明
//!
//! ## 角色定位（Why）
//! - 定义数据流动的两个最小契约：[`Source`]（把字节读入 `Buffer`）与 [`Sink`]（从 `Buffer` 取走字节）；
//! - 契约的单位是“缓冲到缓冲”的移动，实现方可以直接转移分段，而不是逐字节复制。
//!
//! ## 契约说明（What）
//! - `Source::read` 返回 `Ok(None)` 表示数据源已耗尽，`Ok(Some(n))` 中 `n >= 1`
//!   （请求 0 字节时可为 0）；
//! - `Sink::write` 必须恰好取走 `byte_count` 个字节；
//! - 二者都携带一个 [`Timeout`]，默认为“无超时、无截止时间”。引擎本身从不阻塞，
//!   超时信息供包装真实 I/O 的实现参考。
//!
//! ## 适配器
//! - [`ReaderSource`]/[`WriterSink`] 把 `std::io::Read`/`std::io::Write` 接入上述契约；
//! - [`blackhole`] 丢弃写入的所有字节。

use std::io;
use std::time::{Duration, Instant};

use crate::buffer::Buffer;
use crate::buffered::{BufferedSink, BufferedSource};
use crate::error::{Error, Result};
use crate::segment::SEGMENT_SIZE;

static NO_TIMEOUT: Timeout = Timeout::NONE;

/// 字节数据源。
pub trait Source {
    /// 从本数据源移动至多 `byte_count` 个字节到 `sink`；数据源耗尽时返回 `Ok(None)`。
    fn read(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>>;

    fn timeout(&self) -> &Timeout {
        &NO_TIMEOUT
    }

    /// 释放底层资源；重复关闭不产生效果。
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// 以读缓冲包装本数据源。
    fn buffered(self) -> BufferedSource<Self>
    where
        Self: Sized,
    {
        BufferedSource::new(self)
    }
}

/// 字节数据汇。
pub trait Sink {
    /// 从 `source` 头部取走恰好 `byte_count` 个字节。
    fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result<()>;

    /// 把已缓冲的数据推送到最终目的地。
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn timeout(&self) -> &Timeout {
        &NO_TIMEOUT
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// 以写缓冲包装本数据汇。
    fn buffered(self) -> BufferedSink<Self>
    where
        Self: Sized,
    {
        BufferedSink::new(self)
    }
}

impl<S: Source + ?Sized> Source for &mut S {
    fn read(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>> {
        (**self).read(sink, byte_count)
    }

    fn timeout(&self) -> &Timeout {
        (**self).timeout()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

impl<S: Source + ?Sized> Source for Box<S> {
    fn read(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>> {
        (**self).read(sink, byte_count)
    }

    fn timeout(&self) -> &Timeout {
        (**self).timeout()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

impl<K: Sink + ?Sized> Sink for &mut K {
    fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result<()> {
        (**self).write(source, byte_count)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn timeout(&self) -> &Timeout {
        (**self).timeout()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

impl<K: Sink + ?Sized> Sink for Box<K> {
    fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result<()> {
        (**self).write(source, byte_count)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn timeout(&self) -> &Timeout {
        (**self).timeout()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// 超时与截止时间描述。
///
/// - `timeout`：单次操作允许的最长等待；
/// - `deadline`：整个任务必须完成的时间点。
///
/// 二者都是可选的，[`Timeout::NONE`] 表示两者皆无。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Timeout {
    timeout: Option<Duration>,
    deadline: Option<Instant>,
}

impl Timeout {
    pub const NONE: Timeout = Timeout {
        timeout: None,
        deadline: None,
    };

    pub const fn new() -> Self {
        Self::NONE
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn clear_timeout(&mut self) -> &mut Self {
        self.timeout = None;
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn has_deadline(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn set_deadline(&mut self, at: Instant) -> &mut Self {
        self.deadline = Some(at);
        self
    }

    /// 以当前时刻加 `duration` 作为截止时间。
    pub fn deadline_after(&mut self, duration: Duration) -> &mut Self {
        self.set_deadline(Instant::now() + duration)
    }

    pub fn clear_deadline(&mut self) -> &mut Self {
        self.deadline = None;
        self
    }

    /// 截止时间已过时返回 [`Error::DeadlineReached`]。
    pub fn throw_if_reached(&self) -> Result<()> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Error::DeadlineReached),
            _ => Ok(()),
        }
    }
}

/// 把 `std::io::Read` 适配为 [`Source`]。
///
/// 每次 `read` 至多对底层读取器发起一次调用，写入目标缓冲尾分段的剩余空间；
/// 读取器返回 0 视为耗尽。每次读取前检查截止时间。
#[derive(Debug)]
pub struct ReaderSource<R> {
    reader: R,
    timeout: Timeout,
}

impl<R: io::Read> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            timeout: Timeout::NONE,
        }
    }

    pub fn timeout_mut(&mut self) -> &mut Timeout {
        &mut self.timeout
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: io::Read> Source for ReaderSource<R> {
    fn read(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>> {
        if byte_count == 0 {
            return Ok(Some(0));
        }
        self.timeout.throw_if_reached()?;
        loop {
            match sink.read_once(&mut self.reader, byte_count.min(SEGMENT_SIZE)) {
                Ok(0) => return Ok(None),
                Ok(count) => return Ok(Some(count)),
                Err(Error::Io(err)) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
    }

    fn timeout(&self) -> &Timeout {
        &self.timeout
    }
}

/// 把 `std::io::Write` 适配为 [`Sink`]。
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
    timeout: Timeout,
}

impl<W: io::Write> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            timeout: Timeout::NONE,
        }
    }

    pub fn timeout_mut(&mut self) -> &mut Timeout {
        &mut self.timeout
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: io::Write> Sink for WriterSink<W> {
    fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result<()> {
        self.timeout.throw_if_reached()?;
        source.write_to(&mut self.writer, byte_count)
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn timeout(&self) -> &Timeout {
        &self.timeout
    }

    fn close(&mut self) -> Result<()> {
        Sink::flush(self)
    }
}

/// 丢弃所有写入字节的数据汇。
#[derive(Clone, Copy, Debug, Default)]
pub struct Blackhole;

/// 创建一个 [`Blackhole`]。
pub fn blackhole() -> Blackhole {
    Blackhole
}

impl Sink for Blackhole {
    fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result<()> {
        source.skip(byte_count)
    }
}
