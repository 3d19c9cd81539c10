//! # byte_string 模块说明
//!
//! ## 角色定位（Why）
//! - [`ByteString`] 是不可变字节序列，用作缓冲快照、搜索模式与哈希摘要的载体；
//! - 以 `bytes::Bytes` 为底座，既可零拷贝包装分段存储，也可在 `substring` 时共享同一块内存。
//!
//! ## 契约说明（What）
//! - 内容创建后永不改变，UTF-8 解码结果与哈希值在首次访问时计算并缓存；
//! - 排序按无符号字节逐位比较，前缀相同时短者在前；
//! - 哈希为 `31 * h + (byte as i8)` 的有符号 32 位折叠（初值 1），与 [`Buffer`](crate::Buffer) 一致，
//!   因此内容相同的缓冲与字节串哈希值相同。

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use bytes::Bytes;
use memchr::memmem;
use sha2::{Digest, Sha256, Sha512};

use crate::error::{Error, Result, check_offset_and_count};

/// `Display` 输出时保留的最大码点数。
const DISPLAY_CODE_POINTS: usize = 64;

/// 不可变字节序列。
#[derive(Clone)]
pub struct ByteString {
    data: Bytes,
    utf8: OnceLock<String>,
    hash: OnceLock<i32>,
}

impl ByteString {
    /// 空字节串。
    pub const fn empty() -> Self {
        Self {
            data: Bytes::new(),
            utf8: OnceLock::new(),
            hash: OnceLock::new(),
        }
    }

    /// 复制 `bytes` 构造字节串。
    pub fn of(bytes: &[u8]) -> Self {
        Self::from(Bytes::copy_from_slice(bytes))
    }

    /// 以 UTF-8 编码文本；解码缓存直接预置为原文。
    pub fn encode_utf8(text: &str) -> Self {
        let value = Self::from(Bytes::copy_from_slice(text.as_bytes()));
        let _ = value.utf8.set(text.to_owned());
        value
    }

    /// 解码十六进制文本，大小写均可。
    ///
    /// 奇数长度或出现非十六进制字符时返回 [`Error::InvalidHex`]。
    pub fn decode_hex(text: &str) -> Result<Self> {
        Ok(Self::from(hex::decode(text)?))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// 底层 `Bytes`，克隆它不复制数据。
    pub fn as_bytes(&self) -> &Bytes {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.data.to_vec()
    }

    pub fn get_byte(&self, index: usize) -> Result<u8> {
        check_offset_and_count(self.len(), index, 1)?;
        Ok(self.data[index])
    }

    /// 以 UTF-8 解码，非法序列替换为 U+FFFD，结果缓存。
    pub fn utf8(&self) -> &str {
        self.utf8
            .get_or_init(|| String::from_utf8_lossy(&self.data).into_owned())
    }

    /// 小写十六进制。
    pub fn hex(&self) -> String {
        hex::encode(&self.data)
    }

    /// 内容哈希，结果缓存。
    pub fn hash_code(&self) -> i32 {
        *self.hash.get_or_init(|| hash_bytes(1, &self.data))
    }

    /// ASCII 大写转小写；无大写字母时返回共享同一存储的克隆。
    pub fn to_ascii_lowercase(&self) -> Self {
        if !self.data.iter().any(u8::is_ascii_uppercase) {
            return self.clone();
        }
        Self::from(self.data.to_ascii_lowercase())
    }

    /// ASCII 小写转大写。
    pub fn to_ascii_uppercase(&self) -> Self {
        if !self.data.iter().any(u8::is_ascii_lowercase) {
            return self.clone();
        }
        Self::from(self.data.to_ascii_uppercase())
    }

    /// 截取 `[begin, end)`，与原字节串共享存储。
    pub fn substring(&self, begin: usize, end: usize) -> Result<Self> {
        if end > self.len() {
            return Err(Error::OutOfBounds {
                size: self.len(),
                offset: begin,
                byte_count: end.saturating_sub(begin),
            });
        }
        if begin > end {
            return Err(Error::invalid_argument(format!(
                "end < begin: {end} < {begin}"
            )));
        }
        if begin == 0 && end == self.len() {
            return Ok(self.clone());
        }
        Ok(Self::from(self.data.slice(begin..end)))
    }

    /// 比较本串 `[offset, offset + byte_count)` 与 `other[other_offset..]` 的前 `byte_count` 字节。
    ///
    /// 任一范围越界时返回 `false`。
    pub fn range_equals(
        &self,
        offset: usize,
        other: &[u8],
        other_offset: usize,
        byte_count: usize,
    ) -> bool {
        let (Some(this_end), Some(other_end)) = (
            offset.checked_add(byte_count),
            other_offset.checked_add(byte_count),
        ) else {
            return false;
        };
        this_end <= self.len()
            && other_end <= other.len()
            && self.data[offset..this_end] == other[other_offset..other_end]
    }

    pub fn starts_with(&self, prefix: impl AsRef<[u8]>) -> bool {
        self.data.starts_with(prefix.as_ref())
    }

    pub fn ends_with(&self, suffix: impl AsRef<[u8]>) -> bool {
        self.data.ends_with(suffix.as_ref())
    }

    /// 自 `from` 起正向查找 `other` 首次出现的位置。
    pub fn index_of(&self, other: impl AsRef<[u8]>, from: usize) -> Option<usize> {
        if from > self.len() {
            return None;
        }
        memmem::find(&self.data[from..], other.as_ref()).map(|index| index + from)
    }

    /// 查找 `other` 最后一次出现、且起点不大于 `from` 的位置。
    pub fn last_index_of(&self, other: impl AsRef<[u8]>, from: usize) -> Option<usize> {
        let other = other.as_ref();
        let latest = self.len().checked_sub(other.len())?;
        let end = from.min(latest) + other.len();
        memmem::rfind(&self.data[..end], other)
    }

    /// 以任意 `sha2`/`digest` 兼容算法计算摘要。
    pub fn digest<D: Digest>(&self) -> Self {
        Self::from(D::digest(&self.data).to_vec())
    }

    pub fn sha256(&self) -> Self {
        self.digest::<Sha256>()
    }

    pub fn sha512(&self) -> Self {
        self.digest::<Sha512>()
    }
}

/// 内容哈希的折叠步骤，`seed` 为前一段的结果。
pub(crate) fn hash_bytes(seed: i32, bytes: &[u8]) -> i32 {
    bytes.iter().fold(seed, |hash, &byte| {
        hash.wrapping_mul(31).wrapping_add(i32::from(byte as i8))
    })
}

impl Default for ByteString {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Bytes> for ByteString {
    fn from(data: Bytes) -> Self {
        Self {
            data,
            utf8: OnceLock::new(),
            hash: OnceLock::new(),
        }
    }
}

impl From<Vec<u8>> for ByteString {
    fn from(data: Vec<u8>) -> Self {
        Self::from(Bytes::from(data))
    }
}

impl From<&[u8]> for ByteString {
    fn from(data: &[u8]) -> Self {
        Self::of(data)
    }
}

impl From<&str> for ByteString {
    fn from(text: &str) -> Self {
        Self::encode_utf8(text)
    }
}

impl From<ByteString> for Bytes {
    fn from(value: ByteString) -> Self {
        value.data
    }
}

impl AsRef<[u8]> for ByteString {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl PartialEq for ByteString {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Eq for ByteString {}

impl PartialEq<[u8]> for ByteString {
    fn eq(&self, other: &[u8]) -> bool {
        self.data == other
    }
}

impl PartialEq<&[u8]> for ByteString {
    fn eq(&self, other: &&[u8]) -> bool {
        self.data == *other
    }
}

impl PartialOrd for ByteString {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ByteString {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_slice().cmp(other.as_slice())
    }
}

impl Hash for ByteString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_i32(self.hash_code());
    }
}

impl fmt::Display for ByteString {
    /// 可读时输出文本，否则输出十六进制；超过 64 个码点/字节时截断并附带总长度。
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("[size=0]");
        }
        let text = self.utf8();
        match printable_prefix(text, DISPLAY_CODE_POINTS) {
            Some(end) => {
                let escaped = escape(&text[..end]);
                if end < text.len() {
                    write!(f, "[size={} text={escaped}...]", self.len())
                } else {
                    write!(f, "[text={escaped}]")
                }
            }
            None if self.len() <= DISPLAY_CODE_POINTS => write!(f, "[hex={}]", self.hex()),
            None => write!(
                f,
                "[size={} hex={}...]",
                self.len(),
                hex::encode(&self.data[..DISPLAY_CODE_POINTS])
            ),
        }
    }
}

impl fmt::Debug for ByteString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// 前 `limit` 个码点的字节长度；遇到控制字符（`\n`、`\r` 除外）或替换字符时返回 `None`。
fn printable_prefix(text: &str, limit: usize) -> Option<usize> {
    for (count, (index, ch)) in text.char_indices().enumerate() {
        if count == limit {
            return Some(index);
        }
        if (ch.is_control() && ch != '\n' && ch != '\r') || ch == char::REPLACEMENT_CHARACTER {
            return None;
        }
    }
    Some(text.len())
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip_accepts_either_case() {
        let decoded = ByteString::decode_hex("CAFEbabe").expect("合法十六进制");
        assert_eq!(decoded.as_slice(), &[0xca, 0xfe, 0xba, 0xbe]);
        assert_eq!(decoded.hex(), "cafebabe");
        assert!(ByteString::decode_hex("abc").is_err());
        assert!(ByteString::decode_hex("zz").expect_err("非法字符").is_fault());
    }

    #[test]
    fn hash_code_matches_buffer_polynomial() {
        assert_eq!(ByteString::empty().hash_code(), 1);
        assert_eq!(ByteString::from("abc").hash_code(), 126_145);
        assert_eq!(ByteString::of(&[0xff]).hash_code(), 30);
    }

    #[test]
    fn ordering_is_unsigned_then_shorter_first() {
        let low = ByteString::of(&[0x01]);
        let high = ByteString::of(&[0x81]);
        assert!(low < high);
        assert!(ByteString::of(b"ab") < ByteString::of(b"abc"));
        assert_eq!(ByteString::of(b"abc").cmp(&ByteString::from("abc")), Ordering::Equal);
    }

    #[test]
    fn substring_shares_storage() {
        let value = ByteString::from("hello world");
        let world = value.substring(6, 11).expect("合法区间");
        assert_eq!(world.utf8(), "world");
        assert_eq!(
            world.as_bytes().as_ptr(),
            value.as_bytes()[6..].as_ptr()
        );
        assert!(value.substring(3, 2).expect_err("end < begin").is_fault());
        assert!(value.substring(0, 12).is_err());
    }

    #[test]
    fn search_and_compare() {
        let value = ByteString::from("abcabc");
        assert_eq!(value.index_of(b"bc", 0), Some(1));
        assert_eq!(value.index_of(b"bc", 2), Some(4));
        assert_eq!(value.index_of(b"bd", 0), None);
        assert_eq!(value.last_index_of(b"abc", usize::MAX), Some(3));
        assert_eq!(value.last_index_of(b"abc", 2), Some(0));
        assert_eq!(value.last_index_of(b"abcabcabc", 9), None);
        assert!(value.starts_with(b"abc"));
        assert!(value.ends_with(ByteString::from("cabc")));
        assert!(value.range_equals(3, b"xabc", 1, 3));
        assert!(!value.range_equals(4, b"bcd", 0, 3));
    }

    #[test]
    fn ascii_case_conversion() {
        let mixed = ByteString::from("MiXeD 123");
        assert_eq!(mixed.to_ascii_lowercase().utf8(), "mixed 123");
        assert_eq!(mixed.to_ascii_uppercase().utf8(), "MIXED 123");
        let lower = ByteString::from("already");
        assert_eq!(
            lower.to_ascii_lowercase().as_bytes().as_ptr(),
            lower.as_bytes().as_ptr()
        );
    }

    #[test]
    fn digests() {
        assert_eq!(
            ByteString::from("abc").sha256().hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(ByteString::empty().sha512().len(), 64);
    }

    #[test]
    fn display_prefers_text_then_hex() {
        assert_eq!(ByteString::empty().to_string(), "[size=0]");
        assert_eq!(ByteString::from("a\r\nb\\c").to_string(), "[text=a\\r\\nb\\\\c]");
        assert_eq!(ByteString::of(&[0, 1]).to_string(), "[hex=0001]");
        assert_eq!(
            ByteString::of(&[0xc3, 0x28]).to_string(),
            "[hex=c328]",
            "非法 UTF-8 走十六进制"
        );

        let long_text = "a".repeat(65);
        assert_eq!(
            ByteString::from(long_text.as_str()).to_string(),
            format!("[size=65 text={}...]", "a".repeat(64))
        );
        let long_binary = ByteString::from(vec![0u8; 65]);
        assert_eq!(
            long_binary.to_string(),
            format!("[size=65 hex={}...]", "00".repeat(64))
        );
        assert_eq!(
            ByteString::from(vec![0u8; 64]).to_string(),
            format!("[hex={}]", "00".repeat(64))
        );
    }

    #[test]
    fn display_truncates_by_code_points() {
        let text = "é".repeat(70);
        assert_eq!(
            ByteString::from(text.as_str()).to_string(),
            format!("[size=140 text={}...]", "é".repeat(64))
        );
    }
}
