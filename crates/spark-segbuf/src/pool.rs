use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex;
use tracing::{debug, trace};

use crate::segment::{SEGMENT_SIZE, Segment, SegmentData};

/// 默认池容量上限：128 个分段。
pub const DEFAULT_POOL_MAX_BYTES: usize = 128 * SEGMENT_SIZE;

/// `SegmentPool` 是分段存储的有界自由链表，用于在缓冲之间复用 [`SEGMENT_SIZE`] 字节的存储块。
///
/// # 模块角色（Why）
/// - 缓冲引擎在读写过程中频繁申请、释放固定大小的分段，池化可以显著减少堆分配；
/// - 池只接受**未被共享**的存储，保证复用的分段不会与任何快照或克隆别名。
///
/// # 核心机制（How）
/// - 内部维护 `spin::Mutex<FreeList>`，`take` 从链表弹出，`recycle` 压回；
/// - 池中字节数（`byte_count`）与链表在同一把锁下更新，任何时刻都不超过 `max_bytes`；
/// - `PoolMetrics` 以原子计数记录新分配、复用与丢弃次数，支撑 [`SegmentPool::statistics`] 快照。
///
/// # 契约说明（What）
/// - **线程安全**：句柄可克隆，所有克隆共享同一自由链表，满足 `Send + Sync`；
/// - **后置条件**：`take` 返回的分段为独占所有者，`pos == limit == 0`；
/// - **回收规则**：共享存储直接丢弃（由最后一个持有者释放）；池满时丢弃并输出 `trace` 日志。
///
/// # 设计权衡（Trade-offs）
/// - 使用自旋锁而非阻塞锁：临界区只有一次 `Vec::push/pop`，自旋开销可忽略；
/// - 复用的存储不清零：分段只暴露 `[pos, limit)`，旧字节对调用方不可见。
#[derive(Clone)]
pub struct SegmentPool {
    inner: Arc<PoolInner>,
}

impl Default for SegmentPool {
    fn default() -> Self {
        Self::with_config(PoolConfig::default())
    }
}

impl SegmentPool {
    /// 以默认配置创建独立的池实例。
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner::new(config.max_bytes())),
        }
    }

    /// 当前线程的默认池。
    ///
    /// 同一线程内的所有缓冲共享该实例；线程本地存储已销毁时（例如在其它线程本地值的析构中）
    /// 返回一个新的独立池。
    pub fn thread_default() -> Self {
        thread_local! {
            static THREAD_POOL: SegmentPool = SegmentPool::new();
        }
        THREAD_POOL
            .try_with(SegmentPool::clone)
            .unwrap_or_else(|_| SegmentPool::new())
    }

    /// 取出一个空分段：优先复用自由链表，否则新分配。
    pub(crate) fn take(&self) -> Segment {
        let reused = {
            let mut list = self.inner.free_list.lock();
            let storage = list.segments.pop();
            if storage.is_some() {
                list.byte_count -= SEGMENT_SIZE;
            }
            storage
        };
        match reused {
            Some(storage) => {
                self.inner.metrics.reuses.fetch_add(1, Ordering::Relaxed);
                Segment::from_storage(storage)
            }
            None => {
                self.inner
                    .metrics
                    .fresh_allocations
                    .fetch_add(1, Ordering::Relaxed);
                Segment::new()
            }
        }
    }

    /// 归还一个已脱链的分段。
    pub(crate) fn recycle(&self, segment: Segment) {
        let Some(storage) = segment.into_unique_storage() else {
            return;
        };
        let mut list = self.inner.free_list.lock();
        if list.byte_count + SEGMENT_SIZE > self.inner.max_bytes {
            drop(list);
            self.inner.metrics.discards.fetch_add(1, Ordering::Relaxed);
            trace!(
                max_bytes = self.inner.max_bytes,
                "segment pool is full, discarding segment"
            );
            return;
        }
        list.byte_count += SEGMENT_SIZE;
        list.segments.push(storage);
    }

    /// 池中当前缓存的字节数。
    pub fn byte_count(&self) -> usize {
        self.inner.free_list.lock().byte_count
    }

    pub fn max_bytes(&self) -> usize {
        self.inner.max_bytes
    }

    /// 清空自由链表，返回释放的字节数。
    pub fn shrink_to_fit(&self) -> usize {
        let released = {
            let mut list = self.inner.free_list.lock();
            let released = list.byte_count;
            list.segments.clear();
            list.byte_count = 0;
            released
        };
        debug!(released, "segment pool shrunk");
        released
    }

    /// 读取一份统计快照。
    pub fn statistics(&self) -> PoolStats {
        let (pooled_bytes, pooled_segments) = {
            let list = self.inner.free_list.lock();
            (list.byte_count, list.segments.len())
        };
        let metrics = &self.inner.metrics;
        PoolStats {
            pooled_bytes,
            pooled_segments,
            max_bytes: self.inner.max_bytes,
            fresh_allocations: metrics.fresh_allocations.load(Ordering::Relaxed),
            reuses: metrics.reuses.load(Ordering::Relaxed),
            discards: metrics.discards.load(Ordering::Relaxed),
        }
    }

    /// 两个句柄是否指向同一个池。
    pub fn ptr_eq(&self, other: &SegmentPool) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for SegmentPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentPool")
            .field("byte_count", &self.byte_count())
            .field("max_bytes", &self.inner.max_bytes)
            .finish()
    }
}

/// 池配置。
///
/// `max_bytes` 会向下取整到 [`SEGMENT_SIZE`] 的整数倍；取 0 表示禁用缓存，所有归还的分段直接释放。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PoolConfig {
    max_bytes: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolConfig {
    pub const fn new() -> Self {
        Self {
            max_bytes: DEFAULT_POOL_MAX_BYTES,
        }
    }

    pub const fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes - max_bytes % SEGMENT_SIZE;
        self
    }

    pub const fn max_bytes(&self) -> usize {
        self.max_bytes
    }
}

/// [`SegmentPool::statistics`] 返回的快照。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PoolStats {
    /// 自由链表中缓存的字节数。
    pub pooled_bytes: usize,
    pub pooled_segments: usize,
    pub max_bytes: usize,
    /// 自由链表未命中、直接向堆申请的次数。
    pub fresh_allocations: u64,
    pub reuses: u64,
    /// 因池满被丢弃的回收次数。
    pub discards: u64,
}

struct FreeList {
    segments: Vec<SegmentData>,
    byte_count: usize,
}

struct PoolInner {
    free_list: Mutex<FreeList>,
    max_bytes: usize,
    metrics: PoolMetrics,
}

impl PoolInner {
    fn new(max_bytes: usize) -> Self {
        Self {
            free_list: Mutex::new(FreeList {
                segments: Vec::new(),
                byte_count: 0,
            }),
            max_bytes,
            metrics: PoolMetrics::default(),
        }
    }
}

#[derive(Default)]
struct PoolMetrics {
    fresh_allocations: AtomicU64,
    reuses: AtomicU64,
    discards: AtomicU64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn recycled_storage_returns_to_pool() {
        let pool = SegmentPool::new();
        let mut segment = pool.take();
        assert!(segment.is_writable());
        assert_eq!((segment.pos, segment.limit), (0, 0));
        segment.writable_tail()[..3].copy_from_slice(b"abc");
        segment.limit = 3;
        pool.recycle(segment);
        assert_eq!(pool.byte_count(), SEGMENT_SIZE);

        let reused = pool.take();
        assert_eq!((reused.pos, reused.limit), (0, 0));
        assert_eq!(pool.byte_count(), 0);

        let stats = pool.statistics();
        assert_eq!(stats.fresh_allocations, 1);
        assert_eq!(stats.reuses, 1);
    }

    #[test]
    fn shared_storage_is_never_pooled() {
        let pool = SegmentPool::new();
        let segment = pool.take();
        let view = segment.share();
        pool.recycle(segment);
        assert_eq!(pool.byte_count(), 0);

        // 最后一个持有者独占存储后即可回收。
        pool.recycle(view);
        assert_eq!(pool.byte_count(), SEGMENT_SIZE);
    }

    #[test]
    #[traced_test]
    fn full_pool_discards_and_traces() {
        let pool = SegmentPool::with_config(PoolConfig::new().with_max_bytes(SEGMENT_SIZE));
        let first = pool.take();
        let second = pool.take();
        pool.recycle(first);
        pool.recycle(second);

        assert_eq!(pool.byte_count(), SEGMENT_SIZE);
        assert_eq!(pool.statistics().discards, 1);
        assert!(logs_contain("segment pool is full"));
    }

    #[test]
    fn shrink_releases_everything() {
        let pool = SegmentPool::new();
        let segments: Vec<_> = (0..4).map(|_| pool.take()).collect();
        segments.into_iter().for_each(|segment| pool.recycle(segment));
        assert_eq!(pool.statistics().pooled_segments, 4);

        assert_eq!(pool.shrink_to_fit(), 4 * SEGMENT_SIZE);
        assert_eq!(pool.byte_count(), 0);
    }

    #[test]
    fn config_rounds_down_to_whole_segments() {
        assert_eq!(PoolConfig::default().max_bytes(), DEFAULT_POOL_MAX_BYTES);
        assert_eq!(
            PoolConfig::new().with_max_bytes(3 * SEGMENT_SIZE + 17).max_bytes(),
            3 * SEGMENT_SIZE
        );
        let disabled = SegmentPool::with_config(PoolConfig::new().with_max_bytes(0));
        disabled.recycle(disabled.take());
        assert_eq!(disabled.byte_count(), 0);
    }

    #[test]
    fn thread_default_is_shared_within_thread() {
        let a = SegmentPool::thread_default();
        let b = SegmentPool::thread_default();
        assert!(a.ptr_eq(&b));
        let other = std::thread::spawn(SegmentPool::thread_default)
            .join()
            .expect("线程不应 panic");
        assert!(!a.ptr_eq(&other));
    }
}
