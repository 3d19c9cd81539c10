//! # segment 模块说明
//!
//! ## 角色定位（Why）
//! - `Segment` 是缓冲引擎的最小存储单元：一块固定 [`SEGMENT_SIZE`] 字节的存储，
//!   外加一段有效窗口 `[pos, limit)`；
//! - `SegmentRing` 以索引链表形式维护一个 `Buffer` 的分段序列，
//!   提供 O(1) 的头尾增删、在任意分段前后插入以及分裂、合并等结构性操作。
//!
//! ## 核心机制（How）
//! - 存储以 `Arc<[u8; SEGMENT_SIZE]>` 持有，强引用计数大于 1 即视为“共享”；
//!   共享存储一律只读，写入前通过 `debug_assert` 校验独占，再经 `Arc::make_mut` 取得可变视图；
//! - 环形链表不使用指针，而是使用 `Vec` 槽位 + 空闲槽位栈，
//!   节点的 `prev`/`next` 保存槽位索引，分段本身不携带任何链接字段。
//!   因此被 [`SegmentRing::pop`] 摘下的 `Segment` 在类型层面就是“已脱链”的，可直接交给池回收；
//! - 分裂遵循“大块共享、小块复制”：前缀不少于 [`SHARE_MINIMUM`] 时创建共享视图，否则复制进新分段。
//!
//! ## 契约说明（What）
//! - 环中的分段在每次公开操作结束时都非空；
//! - 仅当 `owner && !shared` 时分段可写，视图分段（`owner == false`）永不追加写入；
//! - 所有越界或违背前置条件的调用属于内部缺陷，直接 `panic`，不会返回错误。

use std::fmt;
use std::sync::Arc;

use crate::pool::SegmentPool;

/// 单个分段的存储容量（字节）。
pub const SEGMENT_SIZE: usize = 8192;

/// 分裂时选择共享而非复制的最小字节数。
pub const SHARE_MINIMUM: usize = 1024;

/// 分段存储块。强引用计数即共享计数。
pub(crate) type SegmentData = Arc<[u8; SEGMENT_SIZE]>;

/// 一个分段：存储块 + 有效窗口。
pub(crate) struct Segment {
    data: SegmentData,
    /// 下一个可读字节。
    pub(crate) pos: usize,
    /// 第一个可写字节。
    pub(crate) limit: usize,
    owner: bool,
}

impl Segment {
    /// 分配一块全新的零初始化存储。
    pub(crate) fn new() -> Self {
        Self::from_storage(Arc::new([0; SEGMENT_SIZE]))
    }

    /// 以独占存储构造空分段，`pos == limit == 0`。
    pub(crate) fn from_storage(data: SegmentData) -> Self {
        Self {
            data,
            pos: 0,
            limit: 0,
            owner: true,
        }
    }

    /// 创建指向同一存储的视图分段。
    ///
    /// 视图不是所有者，调用后原分段与视图都处于共享状态，均不可写。
    pub(crate) fn share(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            pos: self.pos,
            limit: self.limit,
            owner: false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.limit - self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos == self.limit
    }

    pub(crate) fn is_owner(&self) -> bool {
        self.owner
    }

    pub(crate) fn is_shared(&self) -> bool {
        Arc::strong_count(&self.data) > 1
    }

    pub(crate) fn is_writable(&self) -> bool {
        self.owner && !self.is_shared()
    }

    /// 有效窗口内的只读字节。
    pub(crate) fn readable(&self) -> &[u8] {
        &self.data[self.pos..self.limit]
    }

    /// `limit` 之后的可写区域。
    ///
    /// 前置条件：分段独占且为所有者。
    pub(crate) fn writable_tail(&mut self) -> &mut [u8] {
        let limit = self.limit;
        &mut self.storage_mut()[limit..]
    }

    fn storage_mut(&mut self) -> &mut [u8; SEGMENT_SIZE] {
        debug_assert!(self.is_writable(), "写入了共享或视图分段");
        Arc::make_mut(&mut self.data)
    }

    /// 把本分段前 `byte_count` 个字节移动到 `sink` 末尾。
    ///
    /// 若 `sink` 尾部空间不足，先把其有效数据整体左移到偏移 0。
    pub(crate) fn write_to(&mut self, sink: &mut Segment, byte_count: usize) {
        assert!(sink.is_writable(), "write_to: 目标分段不可写");
        assert!(
            byte_count <= self.len(),
            "write_to: byte_count={byte_count} 超过可读长度 {}",
            self.len()
        );
        if sink.limit + byte_count > SEGMENT_SIZE {
            assert!(
                sink.len() + byte_count <= SEGMENT_SIZE,
                "write_to: 左移后仍无法容纳 {byte_count} 字节"
            );
            let (pos, limit) = (sink.pos, sink.limit);
            sink.storage_mut().copy_within(pos..limit, 0);
            sink.limit -= pos;
            sink.pos = 0;
        }
        let start = sink.limit;
        sink.storage_mut()[start..start + byte_count]
            .copy_from_slice(&self.data[self.pos..self.pos + byte_count]);
        sink.limit += byte_count;
        self.pos += byte_count;
    }

    /// 当存储未被共享时交出存储块，供池复用。
    pub(crate) fn into_unique_storage(self) -> Option<SegmentData> {
        if self.is_shared() { None } else { Some(self.data) }
    }

    /// 生成覆盖当前有效窗口的只读切片，持有存储的一份强引用。
    pub(crate) fn shared_slice(&self) -> SegmentSlice {
        SegmentSlice {
            data: Arc::clone(&self.data),
            pos: self.pos,
            limit: self.limit,
        }
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("pos", &self.pos)
            .field("limit", &self.limit)
            .field("owner", &self.owner)
            .field("shared", &self.is_shared())
            .finish()
    }
}

/// 分段存储上的只读窗口，作为 `bytes::Bytes::from_owner` 的所有者实现零拷贝快照。
pub(crate) struct SegmentSlice {
    data: SegmentData,
    pos: usize,
    limit: usize,
}

impl AsRef<[u8]> for SegmentSlice {
    fn as_ref(&self) -> &[u8] {
        &self.data[self.pos..self.limit]
    }
}

/// 环中分段的句柄，仅在所属 `SegmentRing` 内有效。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct SegmentId(usize);

struct Node {
    segment: Segment,
    prev: usize,
    next: usize,
}

enum Slot {
    Occupied(Node),
    Vacant,
}

/// 分段的双向环形序列。
///
/// # 教案式说明
/// - **意图 (Why)**：`Buffer` 需要同时从头部消费、向尾部追加，并在任意位置插入分裂出的前缀；
///   环形双向链表让这些操作都是 O(1)；
/// - **实现 (How)**：槽位数组 + 空闲槽位栈，节点之间以索引互链，释放的槽位会被复用；
/// - **契约 (What)**：`head` 为 `None` 当且仅当环为空；单节点环的 `prev`/`next` 均指向自身。
#[derive(Default)]
pub(crate) struct SegmentRing {
    slots: Vec<Slot>,
    vacant: Vec<usize>,
    head: Option<usize>,
    count: usize,
}

impl SegmentRing {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 环中的分段数量。
    pub(crate) fn count(&self) -> usize {
        self.count
    }

    pub(crate) fn head(&self) -> Option<SegmentId> {
        self.head.map(SegmentId)
    }

    pub(crate) fn tail(&self) -> Option<SegmentId> {
        self.head.map(|head| SegmentId(self.node(head).prev))
    }

    pub(crate) fn next(&self, id: SegmentId) -> SegmentId {
        SegmentId(self.node(id.0).next)
    }

    pub(crate) fn prev(&self, id: SegmentId) -> SegmentId {
        SegmentId(self.node(id.0).prev)
    }

    pub(crate) fn segment(&self, id: SegmentId) -> &Segment {
        &self.node(id.0).segment
    }

    pub(crate) fn segment_mut(&mut self, id: SegmentId) -> &mut Segment {
        &mut self.node_mut(id.0).segment
    }

    /// 追加到尾部；环为空时成为头部。
    pub(crate) fn push_back(&mut self, segment: Segment) -> SegmentId {
        match self.head {
            None => {
                let index = self.allocate(segment);
                let node = self.node_mut(index);
                node.prev = index;
                node.next = index;
                self.head = Some(index);
                SegmentId(index)
            }
            Some(head) => {
                let tail = self.node(head).prev;
                self.push_after(SegmentId(tail), segment)
            }
        }
    }

    /// 插入到 `at` 之后。
    pub(crate) fn push_after(&mut self, at: SegmentId, segment: Segment) -> SegmentId {
        let next = self.node(at.0).next;
        let index = self.allocate(segment);
        {
            let node = self.node_mut(index);
            node.prev = at.0;
            node.next = next;
        }
        self.node_mut(at.0).next = index;
        self.node_mut(next).prev = index;
        SegmentId(index)
    }

    /// 插入到 `at` 之前；若 `at` 为头部，新分段成为头部。
    pub(crate) fn insert_before(&mut self, at: SegmentId, segment: Segment) -> SegmentId {
        let prev = self.node(at.0).prev;
        let id = self.push_after(SegmentId(prev), segment);
        if self.head == Some(at.0) {
            self.head = Some(id.0);
        }
        id
    }

    /// 摘下指定分段并返回；必要时修正头部。
    pub(crate) fn pop(&mut self, id: SegmentId) -> Segment {
        let (prev, next) = {
            let node = self.node(id.0);
            (node.prev, node.next)
        };
        if next == id.0 {
            self.head = None;
        } else {
            self.node_mut(prev).next = next;
            self.node_mut(next).prev = prev;
            if self.head == Some(id.0) {
                self.head = Some(next);
            }
        }
        self.count -= 1;
        self.vacant.push(id.0);
        match std::mem::replace(&mut self.slots[id.0], Slot::Vacant) {
            Slot::Occupied(node) => node.segment,
            Slot::Vacant => unreachable!("segment slot {} already released", id.0),
        }
    }

    pub(crate) fn pop_front(&mut self) -> Option<Segment> {
        self.head().map(|head| self.pop(head))
    }

    /// 自头向尾遍历。
    pub(crate) fn iter(&self) -> RingIter<'_> {
        RingIter {
            ring: self,
            cursor: self.head,
            remaining: self.count,
        }
    }

    /// 把分段 `id` 分裂为 `[pos, pos + byte_count)` 与剩余部分，返回插在其前方的前缀句柄。
    ///
    /// 前缀不少于 [`SHARE_MINIMUM`] 时与原分段共享存储，否则从 `pool` 取新分段复制。
    pub(crate) fn split(&mut self, id: SegmentId, byte_count: usize, pool: &SegmentPool) -> SegmentId {
        let segment = self.segment_mut(id);
        assert!(
            byte_count > 0 && byte_count <= segment.len(),
            "split: byte_count={byte_count} 超出 (0, {}]",
            segment.len()
        );
        let prefix = if byte_count >= SHARE_MINIMUM {
            let mut view = segment.share();
            view.limit = view.pos + byte_count;
            view
        } else {
            let mut copy = pool.take();
            copy.writable_tail()[..byte_count]
                .copy_from_slice(&segment.readable()[..byte_count]);
            copy.limit = byte_count;
            copy
        };
        segment.pos += byte_count;
        self.insert_before(id, prefix)
    }

    /// 尝试把分段 `id` 并入其前驱；成功时 `id` 被回收到 `pool` 并返回 `true`。
    ///
    /// 仅当前驱可写且剩余空间（含左移可腾出的部分）足以容纳时才会合并。
    pub(crate) fn compact(&mut self, id: SegmentId, pool: &SegmentPool) -> bool {
        let prev = self.prev(id);
        assert!(prev != id, "compact: 分段没有前驱");
        let byte_count = self.segment(id).len();
        let target = self.segment(prev);
        if !target.is_writable() || byte_count > SEGMENT_SIZE - target.limit + target.pos {
            return false;
        }
        let mut segment = self.pop(id);
        segment.write_to(self.segment_mut(prev), byte_count);
        pool.recycle(segment);
        true
    }

    fn allocate(&mut self, segment: Segment) -> usize {
        let node = Slot::Occupied(Node {
            segment,
            prev: 0,
            next: 0,
        });
        self.count += 1;
        match self.vacant.pop() {
            Some(index) => {
                self.slots[index] = node;
                index
            }
            None => {
                self.slots.push(node);
                self.slots.len() - 1
            }
        }
    }

    fn node(&self, index: usize) -> &Node {
        match &self.slots[index] {
            Slot::Occupied(node) => node,
            Slot::Vacant => unreachable!("segment slot {index} already released"),
        }
    }

    fn node_mut(&mut self, index: usize) -> &mut Node {
        match &mut self.slots[index] {
            Slot::Occupied(node) => node,
            Slot::Vacant => unreachable!("segment slot {index} already released"),
        }
    }
}

/// [`SegmentRing::iter`] 的迭代器。
pub(crate) struct RingIter<'a> {
    ring: &'a SegmentRing,
    cursor: Option<usize>,
    remaining: usize,
}

impl<'a> Iterator for RingIter<'a> {
    type Item = &'a Segment;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let node = self.ring.node(self.cursor?);
        self.remaining -= 1;
        self.cursor = Some(node.next);
        Some(&node.segment)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for RingIter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(pool: &SegmentPool, byte: u8, len: usize) -> Segment {
        let mut segment = pool.take();
        segment.writable_tail()[..len].fill(byte);
        segment.limit = len;
        segment
    }

    fn lengths(ring: &SegmentRing) -> Vec<usize> {
        ring.iter().map(Segment::len).collect()
    }

    #[test]
    fn push_and_pop_keep_ring_order() {
        let pool = SegmentPool::new();
        let mut ring = SegmentRing::new();
        let a = ring.push_back(filled(&pool, b'a', 1));
        ring.push_back(filled(&pool, b'b', 2));
        ring.insert_before(a, filled(&pool, b'z', 3));
        assert_eq!(lengths(&ring), vec![3, 1, 2]);
        assert_eq!(ring.segment(ring.tail().expect("非空环必有尾部")).len(), 2);

        let head = ring.pop_front().expect("非空环必有头部");
        assert_eq!(head.readable(), b"zzz");
        assert_eq!(ring.head(), Some(a));
        assert_eq!(ring.count(), 2);

        ring.pop(a);
        ring.pop_front();
        assert!(ring.head().is_none());
        assert_eq!(ring.count(), 0);
        assert!(ring.tail().is_none());
    }

    #[test]
    fn released_slots_are_reused() {
        let pool = SegmentPool::new();
        let mut ring = SegmentRing::new();
        let first = ring.push_back(filled(&pool, 1, 1));
        ring.pop(first);
        let again = ring.push_back(filled(&pool, 2, 1));
        assert_eq!(first, again);
        assert_eq!(ring.next(again), again);
        assert_eq!(ring.prev(again), again);
    }

    #[test]
    fn large_split_shares_storage() {
        let pool = SegmentPool::new();
        let mut ring = SegmentRing::new();
        let id = ring.push_back(filled(&pool, b'x', 4096));
        let prefix = ring.split(id, SHARE_MINIMUM, &pool);

        assert_eq!(ring.head(), Some(prefix));
        assert!(!ring.segment(prefix).is_owner());
        assert!(ring.segment(prefix).is_shared());
        assert!(!ring.segment(id).is_writable());
        assert_eq!(lengths(&ring), vec![SHARE_MINIMUM, 4096 - SHARE_MINIMUM]);
    }

    #[test]
    fn small_split_copies() {
        let pool = SegmentPool::new();
        let mut ring = SegmentRing::new();
        let id = ring.push_back(filled(&pool, b'x', 4096));
        let prefix = ring.split(id, SHARE_MINIMUM - 1, &pool);

        assert!(ring.segment(prefix).is_writable());
        assert!(ring.segment(id).is_writable());
        assert_eq!(ring.segment(prefix).readable(), &[b'x'; SHARE_MINIMUM - 1][..]);
    }

    #[test]
    fn compact_merges_into_writable_predecessor() {
        let pool = SegmentPool::new();
        let mut ring = SegmentRing::new();
        let mut first = filled(&pool, b'a', SEGMENT_SIZE);
        first.pos = SEGMENT_SIZE - 10;
        ring.push_back(first);
        let second = ring.push_back(filled(&pool, b'b', 20));

        assert!(ring.compact(second, &pool));
        assert_eq!(ring.count(), 1);
        let head = ring.segment(ring.head().expect("合并后仍有头部"));
        assert_eq!(head.pos, 0);
        assert_eq!(head.len(), 30);
        assert_eq!(&head.readable()[..10], &[b'a'; 10]);
        assert_eq!(&head.readable()[10..], &[b'b'; 20]);
        assert_eq!(pool.byte_count(), SEGMENT_SIZE);
    }

    #[test]
    fn compact_skips_shared_predecessor() {
        let pool = SegmentPool::new();
        let mut ring = SegmentRing::new();
        let first = ring.push_back(filled(&pool, b'a', 10));
        let _view = ring.segment(first).share();
        let second = ring.push_back(filled(&pool, b'b', 10));

        assert!(!ring.compact(second, &pool));
        assert_eq!(lengths(&ring), vec![10, 10]);
    }

    #[test]
    fn shared_slice_outlives_segment() {
        let pool = SegmentPool::new();
        let segment = filled(&pool, b'q', 3);
        let slice = segment.shared_slice();
        assert!(segment.is_shared());
        drop(segment);
        assert_eq!(slice.as_ref(), b"qqq");
    }
}
