//! 比特流写入器.
//!
//! 按大端位序 (MSB first) 拼装位字段, ADTS 头、PES 时间戳和 PCR 都由它生成.

/// 比特流写入器
///
/// # 示例
/// ```
/// use mp4ts_core::bitwriter::BitWriter;
///
/// let mut bw = BitWriter::with_capacity(2);
/// bw.write_bits(0b1011, 4);
/// bw.write_bits(0b0001, 4);
/// bw.write_bits(0b01010101, 8);
/// assert_eq!(bw.finish(), vec![0b10110001, 0b01010101]);
/// ```
pub struct BitWriter {
    data: Vec<u8>,
    /// 已写入的位数
    len: usize,
}

impl BitWriter {
    /// 以指定字节容量创建写入器
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            len: 0,
        }
    }

    /// 写入 1 个位
    pub fn write_bit(&mut self, bit: u32) {
        let shift = self.len % 8;
        if shift == 0 {
            self.data.push(0);
        }
        if bit & 1 == 1 {
            if let Some(last) = self.data.last_mut() {
                *last |= 0x80 >> shift;
            }
        }
        self.len += 1;
    }

    /// 写入 `value` 的低 N 位 (最多 32 位), 高位在前
    pub fn write_bits(&mut self, value: u32, n: u32) {
        debug_assert!(n <= 32, "write_bits: n={} 超过 32 位", n);
        for i in (0..n).rev() {
            self.write_bit(value >> i);
        }
    }

    /// 写入 `value` 的低 N 位 (最多 64 位)
    pub fn write_bits_u64(&mut self, value: u64, n: u32) {
        if n > 32 {
            self.write_bits((value >> 32) as u32, n - 32);
            self.write_bits(value as u32, 32);
        } else {
            self.write_bits(value as u32, n);
        }
    }

    /// 返回字节数据, 末尾不足一字节的部分以 0 补齐
    pub fn finish(self) -> Vec<u8> {
        self.data
    }
}
