//! # buffered 模块说明
//!
//! ## 角色定位（Why）
//! - [`BufferedSource`] 与 [`BufferedSink`] 在任意 [`Source`]/[`Sink`] 之上叠加一个内部 [`Buffer`]，
//!   把“按分段批量搬运”的底层契约转换为按字节、按字符串读写的便利接口；
//! - 读端按 [`SEGMENT_SIZE`] 为单位向底层拉取，写端只把已写满的分段下推，
//!   从而把底层调用次数压到与数据量成正比的最低水平。
//!
//! ## 契约说明（What）
//! - 关闭后任何操作都返回 [`Error::Closed`]，重复关闭不产生效果；
//! - 读端的“数据不足”统一表现为 [`Error::EndOfData`]，底层错误原样透传；
//! - 写端 `close` 先尝试下推剩余数据，再关闭底层；两步都会执行，返回最先出现的错误。

use tracing::debug;

use crate::buffer::Buffer;
use crate::byte_string::ByteString;
use crate::error::{Error, Result};
use crate::io::{Sink, Source, Timeout};
use crate::pool::SegmentPool;
use crate::segment::SEGMENT_SIZE;

/// 带读缓冲的数据源。
#[derive(Debug)]
pub struct BufferedSource<S> {
    source: S,
    buffer: Buffer,
    closed: bool,
}

impl<S: Source> BufferedSource<S> {
    pub fn new(source: S) -> Self {
        Self::with_pool(source, SegmentPool::thread_default())
    }

    pub fn with_pool(source: S, pool: SegmentPool) -> Self {
        Self {
            source,
            buffer: Buffer::with_pool(pool),
            closed: false,
        }
    }

    /// 内部读缓冲，其中的字节已从底层取出但尚未被消费。
    pub fn buffer(&mut self) -> &mut Buffer {
        &mut self.buffer
    }

    pub fn get_ref(&self) -> &S {
        &self.source
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// 缓冲为空且底层已耗尽时返回 `true`。
    pub fn exhausted(&mut self) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.buffer.is_empty() && !self.fill()?)
    }

    /// 尽量把缓冲补足到 `byte_count` 字节；底层提前耗尽时返回 `false`。
    pub fn request(&mut self, byte_count: usize) -> Result<bool> {
        self.ensure_open()?;
        while self.buffer.len() < byte_count {
            if !self.fill()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn require(&mut self, byte_count: usize) -> Result<()> {
        if !self.request(byte_count)? {
            return Err(Error::EndOfData {
                requested: byte_count,
                available: self.buffer.len(),
            });
        }
        Ok(())
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        self.require(1)?;
        self.buffer.read_byte()
    }

    /// 读取至多 `dst.len()` 个字节；底层耗尽时返回 `Ok(None)`。
    pub fn read(&mut self, dst: &mut [u8]) -> Result<Option<usize>> {
        self.ensure_open()?;
        if self.buffer.is_empty() && !self.fill()? {
            return Ok(None);
        }
        Ok(Some(self.buffer.read(dst)))
    }

    /// 填满 `dst`；不足时已读字节留在 `dst` 前部并返回 [`Error::EndOfData`]。
    pub fn read_fully(&mut self, dst: &mut [u8]) -> Result<()> {
        if let Err(err) = self.require(dst.len()) {
            if err.is_end_of_data() {
                let available = self.buffer.len();
                self.buffer.read_fully(&mut dst[..available])?;
            }
            return Err(err);
        }
        self.buffer.read_fully(dst)
    }

    /// 把恰好 `byte_count` 个字节移动到 `sink`；不足时移动全部已有字节并返回 [`Error::EndOfData`]。
    pub fn read_fully_into(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<()> {
        if let Err(err) = self.require(byte_count) {
            if err.is_end_of_data() {
                let available = self.buffer.len();
                sink.transfer_from(&mut self.buffer, available)?;
            }
            return Err(err);
        }
        self.buffer.read_fully_into(sink, byte_count)
    }

    pub fn read_byte_array(&mut self, byte_count: usize) -> Result<Vec<u8>> {
        self.require(byte_count)?;
        self.buffer.read_byte_array(byte_count)
    }

    pub fn read_byte_array_all(&mut self) -> Result<Vec<u8>> {
        self.drain_source()?;
        Ok(self.buffer.read_byte_array_all())
    }

    pub fn read_byte_string(&mut self, byte_count: usize) -> Result<ByteString> {
        self.require(byte_count)?;
        self.buffer.read_byte_string(byte_count)
    }

    pub fn read_byte_string_all(&mut self) -> Result<ByteString> {
        self.drain_source()?;
        Ok(self.buffer.read_byte_string_all())
    }

    pub fn read_utf8(&mut self, byte_count: usize) -> Result<String> {
        self.require(byte_count)?;
        self.buffer.read_utf8(byte_count)
    }

    pub fn read_utf8_all(&mut self) -> Result<String> {
        self.drain_source()?;
        Ok(self.buffer.read_utf8_all())
    }

    /// 把底层剩余的全部数据写入 `sink`，返回字节数。
    ///
    /// 拉取过程中只下推已写满的分段，最后一次性下推剩余部分。
    pub fn read_all<K: Sink + ?Sized>(&mut self, sink: &mut K) -> Result<usize> {
        self.ensure_open()?;
        let mut total = 0;
        while self.fill()? {
            let complete = self.buffer.complete_segment_byte_count();
            if complete > 0 {
                total += complete;
                sink.write(&mut self.buffer, complete)?;
            }
        }
        let remaining = self.buffer.len();
        if remaining > 0 {
            total += remaining;
            sink.write(&mut self.buffer, remaining)?;
        }
        Ok(total)
    }

    /// 丢弃 `byte_count` 个字节，按需向底层拉取。
    pub fn skip(&mut self, byte_count: usize) -> Result<()> {
        self.ensure_open()?;
        let mut remaining = byte_count;
        while remaining > 0 {
            if self.buffer.is_empty() && !self.fill()? {
                return Err(Error::EndOfData {
                    requested: byte_count,
                    available: byte_count - remaining,
                });
            }
            let step = remaining.min(self.buffer.len());
            self.buffer.skip(step)?;
            remaining -= step;
        }
        Ok(())
    }

    pub fn index_of(&mut self, byte: u8) -> Result<Option<usize>> {
        self.index_of_range(byte, 0, usize::MAX)
    }

    pub fn index_of_from(&mut self, byte: u8, from: usize) -> Result<Option<usize>> {
        self.index_of_range(byte, from, usize::MAX)
    }

    /// 在 `[from, to)` 内查找 `byte`，必要时向底层拉取，但不会越过 `to` 之后继续拉取。
    pub fn index_of_range(&mut self, byte: u8, from: usize, to: usize) -> Result<Option<usize>> {
        self.ensure_open()?;
        if to < from {
            return Err(Error::invalid_argument(format!(
                "to < from: {to} < {from}"
            )));
        }
        let mut from_index = from;
        while from_index < to {
            if let Some(index) = self.buffer.scan_byte(byte, from_index, to) {
                return Ok(Some(index));
            }
            let scanned = self.buffer.len();
            if scanned >= to || !self.fill()? {
                return Ok(None);
            }
            from_index = from_index.max(scanned);
        }
        Ok(None)
    }

    pub fn index_of_byte_string(&mut self, needle: &ByteString) -> Result<Option<usize>> {
        self.index_of_byte_string_from(needle, 0)
    }

    /// 自 `from` 起查找 `needle`，必要时向底层拉取。
    pub fn index_of_byte_string_from(
        &mut self,
        needle: &ByteString,
        from: usize,
    ) -> Result<Option<usize>> {
        self.ensure_open()?;
        if needle.is_empty() {
            return Err(Error::invalid_argument("needle is empty"));
        }
        let mut from_index = from;
        loop {
            if let Some(index) = self.buffer.index_of_byte_string_from(needle, from_index)? {
                return Ok(Some(index));
            }
            let scanned = self.buffer.len();
            if !self.fill()? {
                return Ok(None);
            }
            // 跨越已扫描尾部的匹配仍可能存在，保留 `needle.len() - 1` 字节的重叠。
            from_index = from_index.max((scanned + 1).saturating_sub(needle.len()));
        }
    }

    /// 比较流中 `[offset, offset + byte_count)` 与 `bytes[bytes_offset..]`，按需拉取；
    /// 底层提前耗尽或范围越界时返回 `false`。
    pub fn range_equals(
        &mut self,
        offset: usize,
        bytes: &ByteString,
        bytes_offset: usize,
        byte_count: usize,
    ) -> Result<bool> {
        self.ensure_open()?;
        if offset.checked_add(byte_count).is_none()
            || bytes_offset > bytes.len()
            || bytes.len() - bytes_offset < byte_count
        {
            return Ok(false);
        }
        let expected = &bytes.as_slice()[bytes_offset..bytes_offset + byte_count];
        for (i, &want) in expected.iter().enumerate() {
            let position = offset + i;
            if !self.request(position + 1)? || self.buffer.get_byte(position)? != want {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn timeout(&self) -> &Timeout {
        self.source.timeout()
    }

    /// 关闭底层数据源并丢弃缓冲内容；重复调用不产生效果。
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let result = self.source.close();
        self.buffer.clear();
        result
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        Ok(())
    }

    /// 向底层拉取至多一个分段；底层耗尽时返回 `false`。
    fn fill(&mut self) -> Result<bool> {
        Ok(self.source.read(&mut self.buffer, SEGMENT_SIZE)?.is_some())
    }

    fn drain_source(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.buffer.write_all(&mut self.source)?;
        Ok(())
    }
}

impl<S: Source> Source for BufferedSource<S> {
    fn read(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>> {
        self.ensure_open()?;
        if self.buffer.is_empty() && !self.fill()? {
            return Ok(None);
        }
        Ok(self.buffer.read_into(sink, byte_count))
    }

    fn timeout(&self) -> &Timeout {
        BufferedSource::timeout(self)
    }

    fn close(&mut self) -> Result<()> {
        BufferedSource::close(self)
    }
}

/// 带写缓冲的数据汇。
///
/// 写入先进入内部缓冲，只有写满的分段会被立即下推；调用 [`BufferedSink::flush`]
/// 或 [`BufferedSink::emit`] 才会下推不完整的尾分段。
#[derive(Debug)]
pub struct BufferedSink<K> {
    sink: K,
    buffer: Buffer,
    closed: bool,
}

impl<K: Sink> BufferedSink<K> {
    pub fn new(sink: K) -> Self {
        Self::with_pool(sink, SegmentPool::thread_default())
    }

    pub fn with_pool(sink: K, pool: SegmentPool) -> Self {
        Self {
            sink,
            buffer: Buffer::with_pool(pool),
            closed: false,
        }
    }

    /// 内部写缓冲，其中的字节尚未下推到底层。
    pub fn buffer(&mut self) -> &mut Buffer {
        &mut self.buffer
    }

    pub fn get_ref(&self) -> &K {
        &self.sink
    }

    pub fn get_mut(&mut self) -> &mut K {
        &mut self.sink
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn write(&mut self, src: &[u8]) -> Result<&mut Self> {
        self.ensure_open()?;
        self.buffer.write(src);
        self.emit_complete_segments()
    }

    pub fn write_byte(&mut self, byte: u8) -> Result<&mut Self> {
        self.ensure_open()?;
        self.buffer.write_byte(byte);
        self.emit_complete_segments()
    }

    pub fn write_byte_string(&mut self, value: &ByteString) -> Result<&mut Self> {
        self.ensure_open()?;
        self.buffer.write_byte_string(value);
        self.emit_complete_segments()
    }

    pub fn write_utf8(&mut self, text: &str) -> Result<&mut Self> {
        self.ensure_open()?;
        self.buffer.write_utf8(text);
        self.emit_complete_segments()
    }

    pub fn write_utf16(&mut self, units: &[u16]) -> Result<&mut Self> {
        self.ensure_open()?;
        self.buffer.write_utf16(units);
        self.emit_complete_segments()
    }

    pub fn write_utf8_code_point(&mut self, code_point: u32) -> Result<&mut Self> {
        self.ensure_open()?;
        self.buffer.write_utf8_code_point(code_point)?;
        self.emit_complete_segments()
    }

    /// 读空 `source`，边读边下推写满的分段，返回读取的字节数。
    pub fn write_all<S: Source + ?Sized>(&mut self, source: &mut S) -> Result<usize> {
        self.ensure_open()?;
        let mut total = 0;
        while let Some(count) = source.read(&mut self.buffer, SEGMENT_SIZE)? {
            total += count;
            self.emit_complete_segments()?;
        }
        Ok(total)
    }

    /// 从 `source` 恰好读取 `byte_count` 个字节；提前耗尽时返回 [`Error::EndOfData`]。
    pub fn write_from_source<S: Source + ?Sized>(
        &mut self,
        source: &mut S,
        byte_count: usize,
    ) -> Result<&mut Self> {
        self.ensure_open()?;
        let mut remaining = byte_count;
        while remaining > 0 {
            match source.read(&mut self.buffer, remaining)? {
                Some(count) => remaining -= count,
                None => {
                    return Err(Error::EndOfData {
                        requested: byte_count,
                        available: byte_count - remaining,
                    });
                }
            }
            self.emit_complete_segments()?;
        }
        Ok(self)
    }

    /// 下推所有已写满的分段。
    pub fn emit_complete_segments(&mut self) -> Result<&mut Self> {
        self.ensure_open()?;
        let byte_count = self.buffer.complete_segment_byte_count();
        if byte_count > 0 {
            self.sink.write(&mut self.buffer, byte_count)?;
        }
        Ok(self)
    }

    /// 下推全部缓冲内容，但不刷新底层。
    pub fn emit(&mut self) -> Result<&mut Self> {
        self.ensure_open()?;
        let byte_count = self.buffer.len();
        if byte_count > 0 {
            self.sink.write(&mut self.buffer, byte_count)?;
        }
        Ok(self)
    }

    /// 下推全部缓冲内容并刷新底层。
    pub fn flush(&mut self) -> Result<()> {
        self.emit()?;
        self.sink.flush()
    }

    pub fn timeout(&self) -> &Timeout {
        self.sink.timeout()
    }

    /// 下推剩余数据并关闭底层；两步都会尝试，返回最先出现的错误。重复调用不产生效果。
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let byte_count = self.buffer.len();
        let emitted = if byte_count > 0 {
            self.sink.write(&mut self.buffer, byte_count)
        } else {
            Ok(())
        };
        let closed = self.sink.close();
        self.closed = true;
        match (emitted, closed) {
            (Err(err), Err(close_err)) => {
                debug!(error = %close_err, "sink close failed after an emit failure");
                Err(err)
            }
            (Err(err), Ok(())) | (Ok(()), Err(err)) => Err(err),
            (Ok(()), Ok(())) => Ok(()),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        Ok(())
    }
}

impl<K: Sink> Sink for BufferedSink<K> {
    fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result<()> {
        self.ensure_open()?;
        self.buffer.transfer_from(source, byte_count)?;
        self.emit_complete_segments()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        BufferedSink::flush(self)
    }

    fn timeout(&self) -> &Timeout {
        BufferedSink::timeout(self)
    }

    fn close(&mut self) -> Result<()> {
        BufferedSink::close(self)
    }
}
