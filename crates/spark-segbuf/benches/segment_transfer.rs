use criterion::{Criterion, black_box};
use spark_segbuf::{Buffer, SEGMENT_SIZE, SegmentPool};
use std::{env, time::Duration};

/// 跨缓冲转移：整段转移应与数据量基本无关。
///
/// # 设计背景（Why）
/// - 转移的核心承诺是“搬分段而非搬字节”，一旦实现退化为逐字节复制，耗时会随数据量线性增长；
/// - 基准固定 64 个分段的数据量，对比整段转移与带零头的转移（触发分裂与合并）。
fn bench_transfer(c: &mut Criterion) {
    let pool = SegmentPool::new();
    let payload = vec![0x5a; SEGMENT_SIZE * 64];

    c.bench_function("transfer_whole_segments", |b| {
        b.iter(|| {
            let mut source = Buffer::with_pool(pool.clone());
            source.write(&payload);
            let mut sink = Buffer::with_pool(pool.clone());
            sink.transfer_from(&mut source, payload.len()).expect("长度足够");
            black_box(sink.len())
        });
    });

    c.bench_function("transfer_with_split", |b| {
        b.iter(|| {
            let mut source = Buffer::with_pool(pool.clone());
            source.write(&payload);
            let mut sink = Buffer::with_pool(pool.clone());
            sink.write(&[1; 17]);
            sink.transfer_from(&mut source, payload.len() - 4095).expect("长度足够");
            black_box(sink.segment_sizes().len())
        });
    });
}

/// 小块写入 + 读出的往返成本，覆盖池的取用与回收路径。
fn bench_small_writes(c: &mut Criterion) {
    c.bench_function("small_write_read_roundtrip", |b| {
        let mut buffer = Buffer::new();
        let mut scratch = [0u8; 64];
        b.iter(|| {
            for _ in 0..256 {
                buffer.write(&[7; 64]);
            }
            while buffer.read(&mut scratch) > 0 {}
            black_box(scratch[0])
        });
    });
}

fn main() {
    let mut quick_mode = false;
    for arg in env::args().skip(1) {
        if arg == "--quick" {
            quick_mode = true;
        }
    }

    let mut criterion = Criterion::default();
    if quick_mode {
        criterion = criterion
            .sample_size(10)
            .warm_up_time(Duration::from_millis(100))
            .measurement_time(Duration::from_millis(250));
    }

    bench_transfer(&mut criterion);
    bench_small_writes(&mut criterion);
    criterion.final_summary();
}
