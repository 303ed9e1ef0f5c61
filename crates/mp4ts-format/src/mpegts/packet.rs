//! 188 字节 TS 包.
//!
//! 包在创建时整体填充 0xFF, 之后依次写入适配字段和负载;
//! 未写满的尾部保持 0xFF.

use std::collections::HashMap;

use bitflags::bitflags;
use mp4ts_core::bitwriter::BitWriter;

use super::{TS_PACKET_SIZE, TS_SYNC_BYTE};

/// adaptation_field_control: 仅负载
const AFC_PAYLOAD_ONLY: u8 = 0b01;
/// adaptation_field_control: 适配字段 + 负载
const AFC_ADAPTATION_AND_PAYLOAD: u8 = 0b11;

bitflags! {
    /// 适配字段标志字节
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AdaptationFlags: u8 {
        /// discontinuity_indicator
        const DISCONTINUITY = 0x80;
        /// random_access_indicator
        const RANDOM_ACCESS = 0x40;
        /// elementary_stream_priority_indicator
        const ES_PRIORITY = 0x20;
        /// PCR_flag
        const PCR = 0x10;
        /// OPCR_flag
        const OPCR = 0x08;
        /// splicing_point_flag
        const SPLICING_POINT = 0x04;
        /// transport_private_data_flag
        const PRIVATE_DATA = 0x02;
        /// adaptation_field_extension_flag
        const EXTENSION = 0x01;
    }
}

/// 单个 TS 包
#[derive(Debug, Clone)]
pub struct TsPacket {
    data: [u8; TS_PACKET_SIZE],
    /// 下一个写入位置
    offset: usize,
}

impl TsPacket {
    /// 创建包并写入 4 字节包头 (默认仅负载)
    pub fn new(pid: u16, payload_unit_start: bool, continuity_counter: u8) -> Self {
        let mut data = [0xFF; TS_PACKET_SIZE];
        data[0] = TS_SYNC_BYTE;
        let pusi = if payload_unit_start { 0x40 } else { 0x00 };
        data[1] = pusi | ((pid >> 8) as u8 & 0x1F);
        data[2] = pid as u8;
        data[3] = (AFC_PAYLOAD_ONLY << 4) | (continuity_counter & 0x0F);
        Self { data, offset: 4 }
    }

    /// PID
    pub fn pid(&self) -> u16 {
        (u16::from(self.data[1] & 0x1F) << 8) | u16::from(self.data[2])
    }

    /// 连续性计数器
    pub fn continuity_counter(&self) -> u8 {
        self.data[3] & 0x0F
    }

    /// 剩余可写字节数
    pub fn remaining(&self) -> usize {
        TS_PACKET_SIZE - self.offset
    }

    /// 写入适配字段
    ///
    /// `stuffing` 为希望适配字段整体占用的字节数. 仅需 1 字节填充时
    /// 写一个长度为 0 的适配字段; 否则标志字节与 PCR 占用的部分从中扣除,
    /// 扣到 0 为止.
    pub fn add_adaptation_field(&mut self, random_access: bool, pcr: Option<u64>, stuffing: usize) {
        self.data[3] = (AFC_ADAPTATION_AND_PAYLOAD << 4) | (self.data[3] & 0x0F);

        if !random_access && pcr.is_none() && stuffing == 1 {
            self.data[self.offset] = 0;
            self.offset += 1;
            return;
        }

        let mut flags = AdaptationFlags::empty();
        flags.set(AdaptationFlags::RANDOM_ACCESS, random_access);
        flags.set(AdaptationFlags::PCR, pcr.is_some());

        let mut field_len = 1;
        let mut stuffing = stuffing.saturating_sub(2);
        let pcr_bytes = pcr.map(encode_pcr);
        if pcr_bytes.is_some() {
            field_len += 6;
            stuffing = stuffing.saturating_sub(6);
        }

        let start = self.offset;
        self.data[start] = (field_len + stuffing) as u8;
        self.data[start + 1] = flags.bits();
        if let Some(bytes) = pcr_bytes {
            self.data[start + 2..start + 8].copy_from_slice(&bytes);
        }
        let stuffing_start = start + 1 + field_len;
        self.data[stuffing_start..stuffing_start + stuffing].fill(0xFF);
        self.offset = stuffing_start + stuffing;
    }

    /// 写入负载, 返回实际写入的字节数
    pub fn write_payload(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.remaining());
        self.data[self.offset..self.offset + n].copy_from_slice(&data[..n]);
        self.offset += n;
        n
    }

    /// 完整的 188 字节
    pub fn as_bytes(&self) -> &[u8; TS_PACKET_SIZE] {
        &self.data
    }
}

/// 编码 PCR: 33 位 base (27 MHz / 300) + 6 位保留 + 9 位 extension
fn encode_pcr(pcr: u64) -> [u8; 6] {
    let base = pcr / 300;
    let ext = pcr % 300;
    let mut bw = BitWriter::with_capacity(6);
    bw.write_bits_u64(base & 0x1_FFFF_FFFF, 33);
    bw.write_bits(0x3F, 6);
    bw.write_bits(ext as u32, 9);
    let mut out = [0u8; 6];
    out.copy_from_slice(&bw.finish());
    out
}

/// 按 PID 独立维护的连续性计数器 (模 16)
#[derive(Debug, Clone, Default)]
pub struct ContinuityCounters {
    counters: HashMap<u16, u8>,
}

impl ContinuityCounters {
    /// 创建全部为 0 的计数器
    pub fn new() -> Self {
        Self::default()
    }

    /// 取出 PID 的当前计数并递增
    pub fn next(&mut self, pid: u16) -> u8 {
        let counter = self.counters.entry(pid).or_insert(0);
        let current = *counter;
        *counter = (current + 1) % 16;
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_包头() {
        let p = TsPacket::new(0x0101, true, 17);
        let b = p.as_bytes();
        assert_eq!(&b[..4], &[0x47, 0x41, 0x01, 0x11]);
        assert_eq!(p.pid(), 0x0101);
        assert_eq!(p.continuity_counter(), 1);
        assert_eq!(p.remaining(), 184);
        assert!(b[4..].iter().all(|&x| x == 0xFF));
    }

    #[test]
    fn test_单字节填充() {
        let mut p = TsPacket::new(0x0100, false, 0);
        p.add_adaptation_field(false, None, 1);
        assert_eq!(p.as_bytes()[3] >> 4, 0b11);
        assert_eq!(p.as_bytes()[4], 0);
        assert_eq!(p.remaining(), 183);
    }

    #[test]
    fn test_填充字段() {
        let mut p = TsPacket::new(0x0100, false, 0);
        p.add_adaptation_field(false, None, 10);
        let b = p.as_bytes();
        assert_eq!(b[4], 9);
        assert_eq!(b[5], 0x00);
        assert!(b[6..14].iter().all(|&x| x == 0xFF));
        assert_eq!(p.remaining(), 174);
    }

    #[test]
    fn test_随机访问无填充() {
        let mut p = TsPacket::new(0x0101, true, 0);
        p.add_adaptation_field(true, None, 0);
        let b = p.as_bytes();
        assert_eq!(&b[4..6], &[0x01, 0x40]);
        assert_eq!(p.remaining(), 182);
    }

    #[test]
    fn test_pcr编码() {
        // dts = 90000 → pcr = 27_000_000, base = 90000, ext = 0
        assert_eq!(encode_pcr(27_000_000), [0x00, 0x00, 0xAF, 0xC8, 0x7E, 0x00]);
        // ext 取值 299, 最高位进入第 5 字节
        assert_eq!(encode_pcr(299), [0x00, 0x00, 0x00, 0x00, 0x7F, 0x2B]);

        let mut p = TsPacket::new(0x0100, true, 0);
        p.add_adaptation_field(true, Some(27_000_000), 0);
        let b = p.as_bytes();
        assert_eq!(b[4], 7);
        assert_eq!(b[5], 0x50);
        assert_eq!(&b[6..12], &[0x00, 0x00, 0xAF, 0xC8, 0x7E, 0x00]);
        assert_eq!(p.remaining(), 176);
    }

    #[test]
    fn test_pcr与填充() {
        let mut p = TsPacket::new(0x0100, true, 0);
        p.add_adaptation_field(true, Some(0), 20);
        // 总占用 20 字节: 长度字节 + 19
        assert_eq!(p.as_bytes()[4], 19);
        assert_eq!(p.remaining(), 164);
    }

    #[test]
    fn test_写入负载截断() {
        let mut p = TsPacket::new(0x0100, false, 0);
        assert_eq!(p.write_payload(&[0xAB; 200]), 184);
        assert_eq!(p.remaining(), 0);
        assert_eq!(p.write_payload(&[1]), 0);
    }

    #[test]
    fn test_连续性计数器按pid独立() {
        let mut cc = ContinuityCounters::new();
        let video: Vec<u8> = (0..18).map(|_| cc.next(0x100)).collect();
        assert_eq!(&video[..16], &(0..16).collect::<Vec<u8>>()[..]);
        assert_eq!(&video[16..], &[0, 1]);
        assert_eq!(cc.next(0x101), 0);
        assert_eq!(cc.next(0x100), 2);
    }
}
