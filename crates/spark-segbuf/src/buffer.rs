//! # buffer 模块说明
//!
//! ## 角色定位（Why）
//! - [`Buffer`] 是整个库的核心：一个可增长的字节队列，从尾部写入、从头部读取；
//! - 缓冲之间移动数据时优先**转移分段所有权**而不是复制字节，大块数据的搬运成本与字节数无关。
//!
//! ## 核心机制（How）
//! - 内容保存在 [`SegmentRing`] 中，`size` 始终等于所有分段有效长度之和；
//! - 追加写入只会进入“独占且为所有者”的尾分段，否则从池中取新分段，保证共享存储永不被修改；
//! - 分段被读空后立即摘下并交还池；`Drop` 时剩余分段同样回收；
//! - [`Buffer::transfer_from`] 在需要时分裂源头分段、把分段挂到目标尾部，并尝试与前驱合并，
//!   以限制碎片化：跨缓冲转移后，相邻分段的总长度不会被无谓地拆小。
//!
//! ## 契约说明（What）
//! - **越界**（偏移、长度超出范围）返回 [`Error::OutOfBounds`]，属于调用方缺陷；
//! - **数据不足**（读取多于现有字节）返回 [`Error::EndOfData`]，属于预期内的流控分支；
//! - 单个缓冲不是线程安全的，但可以在线程之间移动；克隆出的缓冲与原缓冲相互独立，可分别交给不同线程。
//!
//! ## 设计权衡（Trade-offs）
//! - 克隆与 `copy_to` 以共享视图实现，代价是被共享的尾分段之后不能再追加写入，需要额外分配一个分段；
//! - 单分段快照零拷贝，多分段快照复制为连续内存，便于 `ByteString` 提供切片视图。

use std::fmt;
use std::hash::{Hash, Hasher};
use std::io;

use bytes::Bytes;
use memchr::memchr;

use crate::byte_string::{ByteString, hash_bytes};
use crate::error::{Error, Result, check_offset_and_count};
use crate::io::{Sink, Source};
use crate::pool::SegmentPool;
use crate::segment::{SEGMENT_SIZE, Segment, SegmentId, SegmentRing};

/// 分段式字节缓冲。
pub struct Buffer {
    ring: SegmentRing,
    size: usize,
    pool: SegmentPool,
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Buffer {
    /// 使用当前线程默认池创建空缓冲。
    pub fn new() -> Self {
        Self::with_pool(SegmentPool::thread_default())
    }

    /// 使用指定池创建空缓冲；分裂与回收都经过该池。
    pub fn with_pool(pool: SegmentPool) -> Self {
        Self {
            ring: SegmentRing::new(),
            size: 0,
            pool,
        }
    }

    pub fn pool(&self) -> &SegmentPool {
        &self.pool
    }

    /// 可读字节数。
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// 与 [`Buffer::is_empty`] 相同，对齐缓冲读取端的命名。
    pub fn exhausted(&self) -> bool {
        self.size == 0
    }

    /// 是否至少有 `byte_count` 个字节可读。
    pub fn request(&self, byte_count: usize) -> bool {
        self.size >= byte_count
    }

    /// 要求至少有 `byte_count` 个字节可读，否则返回 [`Error::EndOfData`]。
    pub fn require(&self, byte_count: usize) -> Result<()> {
        if self.size < byte_count {
            return Err(Error::EndOfData {
                requested: byte_count,
                available: self.size,
            });
        }
        Ok(())
    }

    /// 由头至尾各分段的有效长度，用于观察分段布局。
    pub fn segment_sizes(&self) -> Vec<usize> {
        self.ring.iter().map(Segment::len).collect()
    }

    /// 按分段顺序遍历可读字节。
    pub fn chunks(&self) -> impl Iterator<Item = &[u8]> {
        self.ring.iter().map(Segment::readable)
    }

    /// 已写满的分段中的字节数，即不会再接收追加写入的部分。
    ///
    /// 尾分段若仍为所有者且未写满，其字节不计入。
    pub fn complete_segment_byte_count(&self) -> usize {
        let Some(tail) = self.ring.tail() else {
            return 0;
        };
        let tail = self.ring.segment(tail);
        if tail.limit < SEGMENT_SIZE && tail.is_owner() {
            self.size - tail.len()
        } else {
            self.size
        }
    }

    // ---------------------------------------------------------------------
    // 读取
    // ---------------------------------------------------------------------

    pub fn read_byte(&mut self) -> Result<u8> {
        let Some(head) = self.ring.head() else {
            return Err(Error::EndOfData {
                requested: 1,
                available: 0,
            });
        };
        let byte = self.ring.segment(head).readable()[0];
        self.advance_head(head, 1);
        Ok(byte)
    }

    /// 读取位于 `index` 的字节，不消费。
    pub fn get_byte(&self, index: usize) -> Result<u8> {
        check_offset_and_count(self.size, index, 1)?;
        let (id, start) = self.seek(index).ok_or(Error::OutOfBounds {
            size: self.size,
            offset: index,
            byte_count: 1,
        })?;
        Ok(self.ring.segment(id).readable()[index - start])
    }

    /// 从头分段读取至多 `dst.len()` 个字节，返回实际读取数；缓冲为空时返回 0。
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let Some(head) = self.ring.head() else {
            return 0;
        };
        let segment = self.ring.segment(head);
        let count = dst.len().min(segment.len());
        dst[..count].copy_from_slice(&segment.readable()[..count]);
        self.advance_head(head, count);
        count
    }

    /// 填满 `dst`；数据不足时已有字节写入 `dst` 前部并返回 [`Error::EndOfData`]。
    pub fn read_fully(&mut self, dst: &mut [u8]) -> Result<()> {
        let mut offset = 0;
        while offset < dst.len() {
            let count = self.read(&mut dst[offset..]);
            if count == 0 {
                return Err(Error::EndOfData {
                    requested: dst.len(),
                    available: offset,
                });
            }
            offset += count;
        }
        Ok(())
    }

    pub fn read_byte_array(&mut self, byte_count: usize) -> Result<Vec<u8>> {
        self.require(byte_count)?;
        Ok(self.take_prefix(byte_count))
    }

    pub fn read_byte_array_all(&mut self) -> Vec<u8> {
        self.take_prefix(self.size)
    }

    pub fn read_byte_string(&mut self, byte_count: usize) -> Result<ByteString> {
        self.require(byte_count)?;
        Ok(ByteString::from(self.take_prefix(byte_count)))
    }

    pub fn read_byte_string_all(&mut self) -> ByteString {
        ByteString::from(self.read_byte_array_all())
    }

    /// 解码并消费 `byte_count` 个字节，非法序列替换为 U+FFFD。
    pub fn read_utf8(&mut self, byte_count: usize) -> Result<String> {
        self.require(byte_count)?;
        Ok(self.decode_prefix(byte_count))
    }

    pub fn read_utf8_all(&mut self) -> String {
        self.decode_prefix(self.size)
    }

    /// 丢弃 `byte_count` 个字节；不足时丢弃全部后返回 [`Error::EndOfData`]。
    pub fn skip(&mut self, byte_count: usize) -> Result<()> {
        let skipped = self.discard(byte_count);
        if skipped < byte_count {
            return Err(Error::EndOfData {
                requested: byte_count,
                available: skipped,
            });
        }
        Ok(())
    }

    /// 丢弃全部内容，分段归还池。
    pub fn clear(&mut self) {
        while let Some(segment) = self.ring.pop_front() {
            self.pool.recycle(segment);
        }
        self.size = 0;
    }

    /// 把至多 `byte_count` 个字节移动到 `sink`；本缓冲为空时返回 `None`。
    pub fn read_into(&mut self, sink: &mut Buffer, byte_count: usize) -> Option<usize> {
        if self.size == 0 {
            return None;
        }
        let count = byte_count.min(self.size);
        sink.transfer(self, count);
        Some(count)
    }

    /// 把恰好 `byte_count` 个字节移动到 `sink`；不足时移动全部并返回 [`Error::EndOfData`]。
    pub fn read_fully_into(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<()> {
        if self.size < byte_count {
            let available = self.size;
            sink.transfer(self, available);
            return Err(Error::EndOfData {
                requested: byte_count,
                available,
            });
        }
        sink.transfer(self, byte_count);
        Ok(())
    }

    /// 把全部内容写入任意 [`Sink`]，返回字节数。
    pub fn read_all<K: Sink + ?Sized>(&mut self, sink: &mut K) -> Result<usize> {
        let byte_count = self.size;
        if byte_count > 0 {
            sink.write(self, byte_count)?;
        }
        Ok(byte_count)
    }

    // ---------------------------------------------------------------------
    // 写入
    // ---------------------------------------------------------------------

    /// 追加字节。
    pub fn write(&mut self, src: &[u8]) -> &mut Self {
        let mut offset = 0;
        while offset < src.len() {
            let tail = self.writable_segment(1);
            let segment = self.ring.segment_mut(tail);
            let count = (src.len() - offset).min(SEGMENT_SIZE - segment.limit);
            segment.writable_tail()[..count].copy_from_slice(&src[offset..offset + count]);
            segment.limit += count;
            offset += count;
        }
        self.size += src.len();
        self
    }

    pub fn write_byte(&mut self, byte: u8) -> &mut Self {
        let tail = self.writable_segment(1);
        let segment = self.ring.segment_mut(tail);
        segment.writable_tail()[0] = byte;
        segment.limit += 1;
        self.size += 1;
        self
    }

    pub fn write_byte_string(&mut self, value: &ByteString) -> &mut Self {
        self.write(value.as_slice())
    }

    pub fn write_utf8(&mut self, text: &str) -> &mut Self {
        self.write(text.as_bytes())
    }

    /// 把 UTF-16 文本编码为 UTF-8 追加；不成对的代理项写为 `?`。
    pub fn write_utf16(&mut self, units: &[u16]) -> &mut Self {
        let mut i = 0;
        while i < units.len() {
            let c = u32::from(units[i]);
            if c < 0x80 {
                // ASCII 连续段直接写入尾分段，直到分段写满或遇到非 ASCII。
                let tail = self.writable_segment(1);
                let segment = self.ring.segment_mut(tail);
                let run_limit = units.len().min(i + SEGMENT_SIZE - segment.limit);
                let out = segment.writable_tail();
                let start = i;
                out[0] = c as u8;
                i += 1;
                while i < run_limit && units[i] < 0x80 {
                    out[i - start] = units[i] as u8;
                    i += 1;
                }
                let run = i - start;
                segment.limit += run;
                self.size += run;
            } else if c < 0x800 {
                self.write_byte((c >> 6 | 0xc0) as u8);
                self.write_byte((c & 0x3f | 0x80) as u8);
                i += 1;
            } else if !(0xd800..=0xdfff).contains(&c) {
                self.write_byte((c >> 12 | 0xe0) as u8);
                self.write_byte((c >> 6 & 0x3f | 0x80) as u8);
                self.write_byte((c & 0x3f | 0x80) as u8);
                i += 1;
            } else {
                let low = units.get(i + 1).map_or(0, |&unit| u32::from(unit));
                if c > 0xdbff || !(0xdc00..=0xdfff).contains(&low) {
                    self.write_byte(b'?');
                    i += 1;
                    continue;
                }
                let code_point = 0x10000 + ((c & 0x3ff) << 10 | (low & 0x3ff));
                self.write_byte((code_point >> 18 | 0xf0) as u8);
                self.write_byte((code_point >> 12 & 0x3f | 0x80) as u8);
                self.write_byte((code_point >> 6 & 0x3f | 0x80) as u8);
                self.write_byte((code_point & 0x3f | 0x80) as u8);
                i += 2;
            }
        }
        self
    }

    /// 追加单个码点的 UTF-8 编码；代理项写为 `?`，超过 U+10FFFF 返回 [`Error::InvalidArgument`]。
    pub fn write_utf8_code_point(&mut self, code_point: u32) -> Result<&mut Self> {
        match char::from_u32(code_point) {
            Some(ch) => {
                let mut encoded = [0; 4];
                Ok(self.write(ch.encode_utf8(&mut encoded).as_bytes()))
            }
            None if (0xd800..=0xdfff).contains(&code_point) => Ok(self.write_byte(b'?')),
            None => Err(Error::invalid_argument(format!(
                "unexpected code point: {code_point:#x}"
            ))),
        }
    }

    /// 从 `source` 头部移动 `byte_count` 个字节到本缓冲尾部。
    ///
    /// 优先转移整个分段；只有在必要时才分裂源头分段，小前缀会直接复制进可写尾分段。
    pub fn transfer_from(&mut self, source: &mut Buffer, byte_count: usize) -> Result<()> {
        check_offset_and_count(source.size, 0, byte_count)?;
        self.transfer(source, byte_count);
        Ok(())
    }

    /// 不断从 `source` 读取直到其耗尽，返回读取的字节数。
    pub fn write_all<S: Source + ?Sized>(&mut self, source: &mut S) -> Result<usize> {
        let mut total = 0;
        while let Some(count) = source.read(self, SEGMENT_SIZE)? {
            total += count;
        }
        Ok(total)
    }

    /// 从 `source` 恰好读取 `byte_count` 个字节；提前耗尽时返回 [`Error::EndOfData`]。
    pub fn write_from_source<S: Source + ?Sized>(
        &mut self,
        source: &mut S,
        byte_count: usize,
    ) -> Result<&mut Self> {
        let mut remaining = byte_count;
        while remaining > 0 {
            match source.read(self, remaining)? {
                Some(count) => remaining -= count,
                None => {
                    return Err(Error::EndOfData {
                        requested: byte_count,
                        available: byte_count - remaining,
                    });
                }
            }
        }
        Ok(self)
    }

    // ---------------------------------------------------------------------
    // 查找与比较
    // ---------------------------------------------------------------------

    pub fn index_of(&self, byte: u8) -> Option<usize> {
        self.scan_byte(byte, 0, self.size)
    }

    pub fn index_of_from(&self, byte: u8, from: usize) -> Option<usize> {
        self.scan_byte(byte, from, self.size)
    }

    /// 在 `[from, to)` 内查找 `byte`；`to` 超过长度时截断，`to < from` 为参数错误。
    pub fn index_of_range(&self, byte: u8, from: usize, to: usize) -> Result<Option<usize>> {
        if to < from {
            return Err(Error::invalid_argument(format!(
                "to < from: {to} < {from}"
            )));
        }
        Ok(self.scan_byte(byte, from, to))
    }

    pub fn index_of_byte_string(&self, needle: &ByteString) -> Result<Option<usize>> {
        self.index_of_byte_string_from(needle, 0)
    }

    /// 自 `from` 起查找 `needle` 首次完整出现的位置；空模式为参数错误。
    pub fn index_of_byte_string_from(
        &self,
        needle: &ByteString,
        from: usize,
    ) -> Result<Option<usize>> {
        let needle = needle.as_slice();
        let Some((&first, rest)) = needle.split_first() else {
            return Err(Error::invalid_argument("needle is empty"));
        };
        if needle.len() > self.size {
            return Ok(None);
        }
        // 匹配起点的排他上界。
        let to = self.size - needle.len() + 1;
        if from >= to {
            return Ok(None);
        }
        let Some((mut id, mut start)) = self.seek(from) else {
            return Ok(None);
        };
        loop {
            let data = self.ring.segment(id).readable();
            let end = (to - start).min(data.len());
            let mut i = from.saturating_sub(start);
            while i < end {
                let Some(hit) = memchr(first, &data[i..end]) else {
                    break;
                };
                let candidate = i + hit;
                if self.matches_at(id, candidate + 1, rest) {
                    return Ok(Some(start + candidate));
                }
                i = candidate + 1;
            }
            start += data.len();
            if start >= to {
                return Ok(None);
            }
            id = self.ring.next(id);
        }
    }

    /// 比较本缓冲 `[offset, offset + byte_count)` 与 `bytes[bytes_offset..]` 的前 `byte_count` 字节。
    pub fn range_equals(
        &self,
        offset: usize,
        bytes: &ByteString,
        bytes_offset: usize,
        byte_count: usize,
    ) -> bool {
        if offset > self.size
            || self.size - offset < byte_count
            || bytes_offset > bytes.len()
            || bytes.len() - bytes_offset < byte_count
        {
            return false;
        }
        if byte_count == 0 {
            return true;
        }
        let Some((id, start)) = self.seek(offset) else {
            return false;
        };
        self.matches_at(
            id,
            offset - start,
            &bytes.as_slice()[bytes_offset..bytes_offset + byte_count],
        )
    }

    // ---------------------------------------------------------------------
    // 复制、快照与哈希
    // ---------------------------------------------------------------------

    /// 把 `[offset, offset + byte_count)` 以共享视图追加到 `out`，本缓冲不变。
    pub fn copy_to(&self, out: &mut Buffer, offset: usize, byte_count: usize) -> Result<()> {
        check_offset_and_count(self.size, offset, byte_count)?;
        if byte_count == 0 {
            return Ok(());
        }
        let Some((mut id, start)) = self.seek(offset) else {
            return Ok(());
        };
        let mut skip = offset - start;
        let mut remaining = byte_count;
        while remaining > 0 {
            let mut view = self.ring.segment(id).share();
            view.pos += skip;
            view.limit = view.limit.min(view.pos + remaining);
            remaining -= view.len();
            out.ring.push_back(view);
            skip = 0;
            id = self.ring.next(id);
        }
        out.size += byte_count;
        Ok(())
    }

    /// 当前内容的不可变快照。
    ///
    /// 内容位于单个分段时零拷贝共享该分段，否则复制为连续内存。
    pub fn snapshot(&self) -> ByteString {
        match (self.ring.head(), self.ring.count()) {
            (None, _) => ByteString::empty(),
            (Some(head), 1) => {
                ByteString::from(Bytes::from_owner(self.ring.segment(head).shared_slice()))
            }
            _ => ByteString::from(self.to_vec()),
        }
    }

    /// 快照前 `byte_count` 个字节。
    pub fn snapshot_prefix(&self, byte_count: usize) -> Result<ByteString> {
        check_offset_and_count(self.size, 0, byte_count)?;
        if byte_count == self.size {
            return Ok(self.snapshot());
        }
        let mut prefix = Vec::with_capacity(byte_count);
        for chunk in self.chunks() {
            let take = chunk.len().min(byte_count - prefix.len());
            prefix.extend_from_slice(&chunk[..take]);
            if prefix.len() == byte_count {
                break;
            }
        }
        Ok(ByteString::from(prefix))
    }

    /// 复制全部可读字节，不消费。
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size);
        self.chunks().for_each(|chunk| out.extend_from_slice(chunk));
        out
    }

    /// 与 [`ByteString::hash_code`] 相同的内容哈希，不受分段布局影响。
    pub fn hash_code(&self) -> i32 {
        self.chunks().fold(1, hash_bytes)
    }

    // ---------------------------------------------------------------------
    // std::io 桥接
    // ---------------------------------------------------------------------

    /// 把前 `byte_count` 个字节写入 `writer` 并消费。
    pub fn write_to<W: io::Write + ?Sized>(
        &mut self,
        writer: &mut W,
        byte_count: usize,
    ) -> Result<()> {
        self.require(byte_count)?;
        let mut remaining = byte_count;
        while remaining > 0 {
            let Some(head) = self.ring.head() else {
                break;
            };
            let segment = self.ring.segment(head);
            let count = remaining.min(segment.len());
            writer.write_all(&segment.readable()[..count])?;
            self.advance_head(head, count);
            remaining -= count;
        }
        Ok(())
    }

    /// 把 `[offset, offset + byte_count)` 写入 `writer`，不消费。
    pub fn copy_to_writer<W: io::Write + ?Sized>(
        &self,
        writer: &mut W,
        offset: usize,
        byte_count: usize,
    ) -> Result<()> {
        check_offset_and_count(self.size, offset, byte_count)?;
        if byte_count == 0 {
            return Ok(());
        }
        let Some((mut id, start)) = self.seek(offset) else {
            return Ok(());
        };
        let mut skip = offset - start;
        let mut remaining = byte_count;
        while remaining > 0 {
            let data = &self.ring.segment(id).readable()[skip..];
            let count = remaining.min(data.len());
            writer.write_all(&data[..count])?;
            remaining -= count;
            skip = 0;
            id = self.ring.next(id);
        }
        Ok(())
    }

    /// 从 `reader` 读取直到其返回 0，返回读取的字节数。
    pub fn read_from<R: io::Read + ?Sized>(&mut self, reader: &mut R) -> Result<usize> {
        let mut total = 0;
        loop {
            match self.read_once(reader, SEGMENT_SIZE) {
                Ok(0) => return Ok(total),
                Ok(count) => total += count,
                Err(Error::Io(err)) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
    }

    /// 从 `reader` 恰好读取 `byte_count` 个字节；提前结束时返回 [`Error::EndOfData`]。
    pub fn read_from_exact<R: io::Read + ?Sized>(
        &mut self,
        reader: &mut R,
        byte_count: usize,
    ) -> Result<()> {
        let mut remaining = byte_count;
        while remaining > 0 {
            match self.read_once(reader, remaining) {
                Ok(0) => {
                    return Err(Error::EndOfData {
                        requested: byte_count,
                        available: byte_count - remaining,
                    });
                }
                Ok(count) => remaining -= count,
                Err(Error::Io(err)) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// 对 `reader` 发起一次读取，写入尾分段的剩余空间，至多 `max` 个字节。
    ///
    /// 读到 0 字节或出错时，若尾分段因此为空则摘下归还池。
    pub(crate) fn read_once<R: io::Read + ?Sized>(
        &mut self,
        reader: &mut R,
        max: usize,
    ) -> Result<usize> {
        let tail = self.writable_segment(1);
        let segment = self.ring.segment_mut(tail);
        let room = max.min(SEGMENT_SIZE - segment.limit);
        match reader.read(&mut segment.writable_tail()[..room]) {
            Ok(count) => {
                segment.limit += count;
                self.size += count;
                if count == 0 {
                    self.release_empty_tail(tail);
                }
                Ok(count)
            }
            Err(err) => {
                self.release_empty_tail(tail);
                Err(err.into())
            }
        }
    }

    // ---------------------------------------------------------------------
    // 内部工具
    // ---------------------------------------------------------------------

    /// 由 `transfer_from` 与 `read_into` 共享的转移主体；调用方保证 `byte_count <= source.size`。
    fn transfer(&mut self, source: &mut Buffer, byte_count: usize) {
        debug_assert!(byte_count <= source.size);
        let mut remaining = byte_count;
        while remaining > 0 {
            let Some(mut head) = source.ring.head() else {
                break;
            };
            if remaining < source.ring.segment(head).len() {
                if let Some(tail) = self.ring.tail() {
                    let target = self.ring.segment(tail);
                    if target.is_writable() && remaining + target.len() <= SEGMENT_SIZE {
                        source
                            .ring
                            .segment_mut(head)
                            .write_to(self.ring.segment_mut(tail), remaining);
                        source.size -= remaining;
                        self.size += remaining;
                        return;
                    }
                }
                head = source.ring.split(head, remaining, &source.pool);
            }

            let segment = source.ring.pop(head);
            let moved = segment.len();
            source.size -= moved;
            let id = self.ring.push_back(segment);
            if self.ring.count() > 1 {
                self.ring.compact(id, &self.pool);
            }
            self.size += moved;
            remaining -= moved;
        }
    }

    /// 返回一个至少有 `min_capacity` 字节剩余空间的可写尾分段，必要时从池中追加。
    fn writable_segment(&mut self, min_capacity: usize) -> SegmentId {
        assert!(
            (1..=SEGMENT_SIZE).contains(&min_capacity),
            "unexpected capacity: {min_capacity}"
        );
        if let Some(tail) = self.ring.tail() {
            let segment = self.ring.segment(tail);
            if segment.is_writable() && segment.limit + min_capacity <= SEGMENT_SIZE {
                return tail;
            }
        }
        let segment = self.pool.take();
        self.ring.push_back(segment)
    }

    /// 消费头分段的 `byte_count` 个字节，读空后回收。
    fn advance_head(&mut self, head: SegmentId, byte_count: usize) {
        let segment = self.ring.segment_mut(head);
        segment.pos += byte_count;
        self.size -= byte_count;
        if segment.is_empty() {
            let segment = self.ring.pop(head);
            self.pool.recycle(segment);
        }
    }

    fn release_empty_tail(&mut self, tail: SegmentId) {
        if self.ring.segment(tail).is_empty() {
            let segment = self.ring.pop(tail);
            self.pool.recycle(segment);
        }
    }

    /// 丢弃至多 `byte_count` 个字节，返回实际丢弃数。
    fn discard(&mut self, byte_count: usize) -> usize {
        let mut remaining = byte_count;
        while remaining > 0 {
            let Some(head) = self.ring.head() else {
                break;
            };
            let count = remaining.min(self.ring.segment(head).len());
            self.advance_head(head, count);
            remaining -= count;
        }
        byte_count - remaining
    }

    /// 消费前 `byte_count` 个字节并复制为 `Vec`；调用方保证长度足够。
    fn take_prefix(&mut self, byte_count: usize) -> Vec<u8> {
        let mut out = vec![0; byte_count];
        let mut offset = 0;
        while offset < byte_count {
            let count = self.read(&mut out[offset..]);
            if count == 0 {
                break;
            }
            offset += count;
        }
        out
    }

    /// 消费并解码前 `byte_count` 个字节；完全位于头分段时直接在原地解码。
    fn decode_prefix(&mut self, byte_count: usize) -> String {
        if byte_count == 0 {
            return String::new();
        }
        if let Some(head) = self.ring.head() {
            let segment = self.ring.segment(head);
            if byte_count <= segment.len() {
                let text = String::from_utf8_lossy(&segment.readable()[..byte_count]).into_owned();
                self.advance_head(head, byte_count);
                return text;
            }
        }
        match String::from_utf8(self.take_prefix(byte_count)) {
            Ok(text) => text,
            Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
        }
    }

    /// 定位包含偏移 `offset` 的分段及该分段首字节的逻辑偏移；从距离较近的一端开始遍历。
    fn seek(&self, offset: usize) -> Option<(SegmentId, usize)> {
        let head = self.ring.head()?;
        if offset >= self.size {
            return None;
        }
        if self.size - offset < offset {
            let mut id = head;
            let mut start = self.size;
            loop {
                id = self.ring.prev(id);
                start -= self.ring.segment(id).len();
                if start <= offset {
                    return Some((id, start));
                }
            }
        }
        let mut id = head;
        let mut start = 0;
        loop {
            let len = self.ring.segment(id).len();
            if offset < start + len {
                return Some((id, start));
            }
            start += len;
            id = self.ring.next(id);
        }
    }

    /// 在 `[from, to)` 内查找 `byte`。
    pub(crate) fn scan_byte(&self, byte: u8, from: usize, to: usize) -> Option<usize> {
        let to = to.min(self.size);
        if from >= to {
            return None;
        }
        let (mut id, mut start) = self.seek(from)?;
        loop {
            let data = self.ring.segment(id).readable();
            let begin = from.saturating_sub(start);
            let end = (to - start).min(data.len());
            if let Some(index) = memchr(byte, &data[begin..end]) {
                return Some(start + begin + index);
            }
            start += data.len();
            if start >= to {
                return None;
            }
            id = self.ring.next(id);
        }
    }

    /// 自分段 `id` 的可读偏移 `offset` 起，逐段比较 `expected`；调用方保证剩余字节足够。
    fn matches_at(&self, mut id: SegmentId, mut offset: usize, mut expected: &[u8]) -> bool {
        while !expected.is_empty() {
            let data = self.ring.segment(id).readable();
            if offset == data.len() {
                id = self.ring.next(id);
                offset = 0;
                continue;
            }
            let count = (data.len() - offset).min(expected.len());
            if data[offset..offset + count] != expected[..count] {
                return false;
            }
            expected = &expected[count..];
            offset += count;
        }
        true
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.clear();
    }
}

impl Clone for Buffer {
    /// 深拷贝语义：克隆与原缓冲共享分段存储，但双方此后的读写互不可见。
    fn clone(&self) -> Self {
        let mut ring = SegmentRing::new();
        for segment in self.ring.iter() {
            ring.push_back(segment.share());
        }
        Self {
            ring,
            size: self.size,
            pool: self.pool.clone(),
        }
    }
}

impl PartialEq for Buffer {
    /// 只比较内容，与分段布局无关。
    fn eq(&self, other: &Self) -> bool {
        if self.size != other.size {
            return false;
        }
        let mut ours = self.chunks();
        let mut theirs = other.chunks();
        let (mut a, mut b): (&[u8], &[u8]) = (&[], &[]);
        loop {
            if a.is_empty() {
                match ours.next() {
                    Some(chunk) => a = chunk,
                    None => return true,
                }
            }
            if b.is_empty() {
                match theirs.next() {
                    Some(chunk) => b = chunk,
                    None => return true,
                }
            }
            let count = a.len().min(b.len());
            if a[..count] != b[..count] {
                return false;
            }
            a = &a[count..];
            b = &b[count..];
        }
    }
}

impl Eq for Buffer {}

impl Hash for Buffer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_i32(self.hash_code());
    }
}

impl fmt::Display for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&ByteString::from(self.to_vec()), f)
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("size", &self.size)
            .field("segments", &self.segment_sizes())
            .finish()
    }
}

impl Source for Buffer {
    fn read(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>> {
        Ok(self.read_into(sink, byte_count))
    }
}

impl Sink for Buffer {
    fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result<()> {
        self.transfer_from(source, byte_count)
    }
}

impl io::Read for Buffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(Buffer::read(self, buf))
    }
}

impl io::BufRead for Buffer {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        Ok(match self.ring.head() {
            Some(head) => self.ring.segment(head).readable(),
            None => &[],
        })
    }

    fn consume(&mut self, amount: usize) {
        self.discard(amount);
    }
}

impl io::Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Buffer::write(self, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
