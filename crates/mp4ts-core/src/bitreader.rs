//! 比特流读取器.
//!
//! 按大端位序 (MSB first) 从字节缓冲区读取位字段, 用于解析
//! AudioSpecificConfig 和 mdhd 语言码这类非字节对齐的结构.

use crate::{Mp4TsError, Mp4TsResult};

/// 比特流读取器
///
/// # 示例
/// ```
/// use mp4ts_core::bitreader::BitReader;
///
/// let data = [0x12, 0x10];
/// let mut br = BitReader::new(&data);
/// assert_eq!(br.read_bits(5).unwrap(), 2);
/// assert_eq!(br.read_bits(4).unwrap(), 4);
/// assert_eq!(br.read_bits(4).unwrap(), 2);
/// ```
pub struct BitReader<'a> {
    data: &'a [u8],
    /// 已读取的位数
    pos: usize,
}

impl<'a> BitReader<'a> {
    /// 创建读取器, 从第一个字节的最高位开始
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// 剩余可读位数
    pub fn bits_left(&self) -> usize {
        self.data.len() * 8 - self.pos
    }

    /// 读取 N 个位 (最多 32 位), 位数不足时返回 `Truncated`
    pub fn read_bits(&mut self, n: u32) -> Mp4TsResult<u32> {
        if n > 32 {
            return Err(Mp4TsError::Malformed(format!("read_bits: n={} 超过 32 位", n)));
        }
        if n as usize > self.bits_left() {
            return Err(Mp4TsError::Truncated);
        }

        let mut value = 0u32;
        for _ in 0..n {
            let byte = self.data[self.pos / 8];
            let bit = (byte >> (7 - self.pos % 8)) & 1;
            value = (value << 1) | u32::from(bit);
            self.pos += 1;
        }
        Ok(value)
    }

    /// 跳过 N 个位
    pub fn skip_bits(&mut self, n: u32) -> Mp4TsResult<()> {
        if n as usize > self.bits_left() {
            return Err(Mp4TsError::Truncated);
        }
        self.pos += n as usize;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_跨字节读取() {
        let data = [0xFF, 0x00, 0xFF, 0x00];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits(4).unwrap(), 0xF);
        assert_eq!(br.read_bits(24).unwrap(), 0xF00FF0);
        assert_eq!(br.bits_left(), 4);
        assert_eq!(br.read_bits(0).unwrap(), 0);
    }

    #[test]
    fn test_语言码_5位分组() {
        // "und" = (u-0x60, n-0x60, d-0x60) = (21, 14, 4), 前置 1 个填充位
        let data = [0x55, 0xC4];
        let mut br = BitReader::new(&data);
        br.skip_bits(1).unwrap();
        assert_eq!(br.read_bits(5).unwrap(), 21);
        assert_eq!(br.read_bits(5).unwrap(), 14);
        assert_eq!(br.read_bits(5).unwrap(), 4);
        assert_eq!(br.bits_left(), 0);
    }

    #[test]
    fn test_位数不足返回截断() {
        let data = [0x00];
        let mut br = BitReader::new(&data);

        br.read_bits(8).unwrap();
        assert!(matches!(br.read_bits(1), Err(Mp4TsError::Truncated)));
        assert!(matches!(br.skip_bits(1), Err(Mp4TsError::Truncated)));
        assert!(matches!(br.read_bits(33), Err(Mp4TsError::Malformed(_))));
    }
}
