//! `Buffer` 性质测试
//!
//! # 教案级注释概览
//!
//! - **核心目标 (Why)**：分段布局随操作序列千变万化，手写用例只能覆盖少数布局。这里用 Proptest 生成随机操作序列，
//!   以 `VecDeque<u8>` 作为影子模型，逐步比对内容与长度，捕获分裂、合并、回收路径上的边界缺陷。
//! - **设计手法 (How)**：
//!   1. `Op` 描述一次公开 API 调用，生成器偏向跨越分段边界的长度；
//!   2. 每步之后检查三条不变量：长度与模型一致、分段长度之和等于长度、环中没有空分段；
//!   3. 其余性质分别覆盖转移守恒、快照不可变、相等性与分段布局无关、UTF-8/UTF-16 编码往返。
//!
//! # 合同与边界 (What)
//!
//! - **输入**：随机字节序列与随机长度，长度上限取分段大小的两倍多，保证频繁跨段；
//! - **输出/断言**：任何一步与模型不一致即失败，Proptest 会自动收缩到最短反例。

use std::collections::VecDeque;

use proptest::prelude::*;
use spark_segbuf::{Buffer, ByteString, SEGMENT_SIZE, utf8};

const MAX_CHUNK: usize = SEGMENT_SIZE * 2 + 17;

#[derive(Clone, Debug)]
enum Op {
    Write(Vec<u8>),
    WriteByte(u8),
    Read(usize),
    Skip(usize),
    TransferOut(usize),
    TransferIn(Vec<u8>),
    CloneAndWrite(Vec<u8>),
    Snapshot,
}

fn chunk() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..64),
        prop::collection::vec(any::<u8>(), 0..MAX_CHUNK),
    ]
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        chunk().prop_map(Op::Write),
        any::<u8>().prop_map(Op::WriteByte),
        (0..MAX_CHUNK).prop_map(Op::Read),
        (0..MAX_CHUNK).prop_map(Op::Skip),
        (0..MAX_CHUNK).prop_map(Op::TransferOut),
        chunk().prop_map(Op::TransferIn),
        chunk().prop_map(Op::CloneAndWrite),
        Just(Op::Snapshot),
    ]
}

fn assert_invariants(buffer: &Buffer, model: &VecDeque<u8>) {
    let sizes = buffer.segment_sizes();
    assert_eq!(buffer.len(), model.len());
    assert_eq!(sizes.iter().sum::<usize>(), buffer.len());
    assert!(sizes.iter().all(|&size| size > 0 && size <= SEGMENT_SIZE), "{sizes:?}");
    assert!(buffer.to_vec().iter().eq(model.iter()));
}

fn apply(buffer: &mut Buffer, model: &mut VecDeque<u8>, op: Op) {
    match op {
        Op::Write(bytes) => {
            buffer.write(&bytes);
            model.extend(bytes);
        }
        Op::WriteByte(byte) => {
            buffer.write_byte(byte);
            model.push_back(byte);
        }
        Op::Read(count) => {
            let count = count.min(model.len());
            let read = buffer.read_byte_array(count).expect("长度已截断");
            let expected: Vec<u8> = model.drain(..count).collect();
            assert_eq!(read, expected);
        }
        Op::Skip(count) => {
            let result = buffer.skip(count);
            let skipped = count.min(model.len());
            model.drain(..skipped);
            assert_eq!(result.is_ok(), skipped == count);
        }
        Op::TransferOut(count) => {
            let count = count.min(model.len());
            let mut sink = Buffer::new();
            sink.transfer_from(buffer, count).expect("长度已截断");
            let expected: Vec<u8> = model.drain(..count).collect();
            assert_eq!(sink.to_vec(), expected);
        }
        Op::TransferIn(bytes) => {
            let mut source = Buffer::new();
            source.write(&bytes);
            buffer.transfer_from(&mut source, bytes.len()).expect("长度相等");
            assert!(source.is_empty());
            model.extend(bytes);
        }
        Op::CloneAndWrite(bytes) => {
            let mut clone = buffer.clone();
            clone.write(&bytes);
            assert_eq!(clone.len(), model.len() + bytes.len());
        }
        Op::Snapshot => {
            let snapshot = buffer.snapshot();
            assert!(snapshot.as_slice().iter().eq(model.iter()));
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// 任意操作序列下，缓冲与影子模型始终一致。
    #[test]
    fn prop_operations_match_model(ops in prop::collection::vec(op(), 1..24)) {
        let mut buffer = Buffer::new();
        let mut model = VecDeque::new();
        for op in ops {
            apply(&mut buffer, &mut model, op);
            assert_invariants(&buffer, &model);
        }
    }

    /// 转移前后两侧总字节数与拼接内容不变。
    #[test]
    fn prop_transfer_conserves_bytes(
        head in chunk(),
        tail in chunk(),
        prefix in chunk(),
        cut in any::<prop::sample::Index>(),
    ) {
        let mut source = Buffer::new();
        source.write(&head).write(&tail);
        let mut sink = Buffer::new();
        sink.write(&prefix);
        let total = source.len() + sink.len();
        let count = cut.index(source.len() + 1);

        sink.transfer_from(&mut source, count).expect("长度已截断");
        prop_assert_eq!(source.len() + sink.len(), total);

        let mut joined = sink.read_byte_array_all();
        joined.extend(source.read_byte_array_all());
        let expected: Vec<u8> = prefix.iter().chain(&head).chain(&tail).copied().collect();
        prop_assert_eq!(joined, expected);
    }

    /// 快照之后对原缓冲的任何修改都不影响快照。
    #[test]
    fn prop_snapshot_is_immutable(
        initial in chunk(),
        ops in prop::collection::vec(op(), 1..12),
    ) {
        let mut buffer = Buffer::new();
        buffer.write(&initial);
        let snapshot = buffer.snapshot();
        let mut model: VecDeque<u8> = initial.iter().copied().collect();
        for op in ops {
            apply(&mut buffer, &mut model, op);
        }
        prop_assert_eq!(snapshot.as_slice(), initial.as_slice());
    }

    /// 相等性与哈希只取决于内容，不取决于分段布局。
    #[test]
    fn prop_equality_ignores_segmentation(
        bytes in prop::collection::vec(any::<u8>(), 0..MAX_CHUNK),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..6),
    ) {
        let mut contiguous = Buffer::new();
        contiguous.write(&bytes);

        let mut points: Vec<usize> = cuts.iter().map(|cut| cut.index(bytes.len() + 1)).collect();
        points.push(0);
        points.push(bytes.len());
        points.sort_unstable();
        let mut fragmented = Buffer::new();
        for window in points.windows(2) {
            let mut part = Buffer::new();
            part.write(&bytes[window[0]..window[1]]);
            let len = part.len();
            fragmented.transfer_from(&mut part, len).expect("长度相等");
        }

        prop_assert!(contiguous == fragmented);
        prop_assert_eq!(contiguous.hash_code(), fragmented.hash_code());
        prop_assert_eq!(contiguous.hash_code(), ByteString::from(bytes).hash_code());
    }

    /// UTF-8 与 UTF-16 写入都能还原原文，长度计算与实际编码一致。
    #[test]
    fn prop_text_round_trips(text in ".{0,300}", padding in 0..SEGMENT_SIZE) {
        let units: Vec<u16> = text.encode_utf16().collect();
        prop_assert_eq!(utf8::size_utf16(&units), text.len());

        let mut buffer = Buffer::new();
        buffer.write(&vec![b'_'; padding]);
        buffer.write_utf16(&units);
        buffer.write_utf8(&text);
        for ch in text.chars() {
            buffer.write_utf8_code_point(u32::from(ch)).expect("合法码点");
        }
        buffer.skip(padding).expect("长度足够");
        let expected = text.repeat(3);
        prop_assert_eq!(buffer.read_utf8_all(), expected);
    }

    /// 单字节查找与线性扫描结果一致。
    #[test]
    fn prop_index_of_matches_linear_scan(
        bytes in prop::collection::vec(0u8..4, 0..MAX_CHUNK),
        needle in 0u8..4,
        from in any::<prop::sample::Index>(),
    ) {
        let mut buffer = Buffer::new();
        buffer.write(&bytes);
        let from = from.index(bytes.len() + 1);
        let expected = bytes[from..].iter().position(|&b| b == needle).map(|i| i + from);
        prop_assert_eq!(buffer.index_of_from(needle, from), expected);
    }

    /// 多字节模式查找在任意分段布局下与线性扫描结果一致，覆盖跨分段的匹配。
    #[test]
    fn prop_index_of_byte_string_matches_linear_scan(
        bytes in prop::collection::vec(0u8..3, 0..MAX_CHUNK),
        pattern in prop::collection::vec(0u8..3, 1..6),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..6),
        from in any::<prop::sample::Index>(),
    ) {
        let mut points: Vec<usize> = cuts.iter().map(|cut| cut.index(bytes.len() + 1)).collect();
        points.push(0);
        points.push(bytes.len());
        points.sort_unstable();
        let mut buffer = Buffer::new();
        for window in points.windows(2) {
            let mut part = Buffer::new();
            part.write(&bytes[window[0]..window[1]]);
            let len = part.len();
            buffer.transfer_from(&mut part, len).expect("长度相等");
        }

        let from = from.index(bytes.len() + 1);
        let expected = (from..bytes.len())
            .find(|&start| bytes[start..].starts_with(&pattern));
        let found = buffer
            .index_of_byte_string_from(&ByteString::from(pattern.clone()), from)
            .expect("非空模式");
        prop_assert_eq!(found, expected);
    }
}
