//! UTF-8 编码长度计算。
//!
//! 与 [`Buffer::write_utf16`](crate::Buffer::write_utf16) 的编码规则保持一致：
//! 不成对的代理项编码为单字节 `?`。

/// 计算 UTF-16 文本编码为 UTF-8 后的字节数。
pub fn size_utf16(units: &[u16]) -> usize {
    let mut result = 0;
    let mut i = 0;
    while i < units.len() {
        let c = units[i];
        if c < 0x80 {
            result += 1;
            i += 1;
        } else if c < 0x800 {
            result += 2;
            i += 1;
        } else if !(0xd800..=0xdfff).contains(&c) {
            result += 3;
            i += 1;
        } else {
            let low = units.get(i + 1).copied().unwrap_or(0);
            if c > 0xdbff || !(0xdc00..=0xdfff).contains(&low) {
                result += 1;
                i += 1;
            } else {
                result += 4;
                i += 2;
            }
        }
    }
    result
}

/// 单个码点的 UTF-8 编码长度；代理项按 `?` 计 1 字节，超过 U+10FFFF 返回 `None`。
pub fn size_code_point(code_point: u32) -> Option<usize> {
    match code_point {
        0..0x80 => Some(1),
        0x80..0x800 => Some(2),
        0xd800..=0xdfff => Some(1),
        0x800..0x10000 => Some(3),
        0x10000..=0x10ffff => Some(4),
        _ => None,
    }
}
