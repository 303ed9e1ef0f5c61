//! PES 头部与访问单元分包.
//!
//! 一个访问单元 (一个采样改写后的数据) 封装为一个 PES 包, 再切分成若干 TS 包:
//! - 首包: TS 头, 需要时的适配字段 (随机访问 / PCR / 填充), PES 头, 尽量多的负载
//! - 后续包: TS 头, 最后一包不足 184 字节时用适配字段填充, 负载
//!
//! 剩余负载用 [`Bytes`] 表示, 每个包从前端切走自己的部分.

use bytes::Bytes;
use mp4ts_core::Mp4TsResult;
use mp4ts_core::bitwriter::BitWriter;

use crate::io::IoContext;

use super::packet::{ContinuityCounters, TsPacket};
use super::{PID_VIDEO, TS_PAYLOAD_SIZE};

/// PES 头固定部分: 起始码(3) + stream_id(1) + 长度(2) + 标志(2) + 头长度(1)
const PES_FIXED_HEADER_SIZE: usize = 9;
/// 一个编码后的时间戳占用的字节数
const PES_TIMESTAMP_SIZE: usize = 5;
/// 27 MHz PCR 与 90 kHz 时钟之比
const PCR_PER_90K: u64 = 300;

/// 待封装的访问单元
#[derive(Debug, Clone)]
pub struct AccessUnit {
    /// 目标 PID
    pub pid: u16,
    /// PES stream_id
    pub stream_id: u8,
    /// 显示时间戳 (90 kHz)
    pub pts: u64,
    /// 解码时间戳 (90 kHz)
    pub dts: u64,
    /// 是否为随机访问点
    pub random_access: bool,
    /// 改写后的负载
    pub payload: Bytes,
}

/// 构建 PES 头部
///
/// PTS 与 DTS 相同时只写 PTS. 包长超过 16 位时写 0 (不限长度).
pub fn pes_header(stream_id: u8, pts: u64, dts: u64, payload_len: usize) -> Vec<u8> {
    let with_dts = pts != dts;
    let timestamps_len = if with_dts {
        2 * PES_TIMESTAMP_SIZE
    } else {
        PES_TIMESTAMP_SIZE
    };
    let packet_len = 3 + payload_len + timestamps_len;
    let packet_len = if packet_len > 0xFFFF { 0 } else { packet_len };

    let mut bw = BitWriter::with_capacity(PES_FIXED_HEADER_SIZE + timestamps_len);
    bw.write_bits(0x00_0001, 24);
    bw.write_bits(u32::from(stream_id), 8);
    bw.write_bits(packet_len as u32, 16);
    bw.write_bits(0x80, 8); // '10', 不加扰
    bw.write_bits(if with_dts { 0xC0 } else { 0x80 }, 8);
    bw.write_bits(timestamps_len as u32, 8);
    if with_dts {
        write_timestamp(&mut bw, 0b0011, pts);
        write_timestamp(&mut bw, 0b0001, dts);
    } else {
        write_timestamp(&mut bw, 0b0010, pts);
    }
    bw.finish()
}

/// 4 位前缀 + 33 位时间戳, 分成 3/15/15 位, 每段后跟一个标记位
fn write_timestamp(bw: &mut BitWriter, prefix: u32, ts: u64) {
    bw.write_bits(prefix, 4);
    bw.write_bits_u64((ts >> 30) & 0x07, 3);
    bw.write_bit(1);
    bw.write_bits_u64((ts >> 15) & 0x7FFF, 15);
    bw.write_bit(1);
    bw.write_bits_u64(ts & 0x7FFF, 15);
    bw.write_bit(1);
}

/// 把一个访问单元分包写出, 返回写出的 TS 包数
pub fn write_access_unit(
    io: &mut IoContext,
    counters: &mut ContinuityCounters,
    au: AccessUnit,
) -> Mp4TsResult<usize> {
    let AccessUnit {
        pid,
        stream_id,
        pts,
        dts,
        random_access,
        mut payload,
    } = au;

    let header = pes_header(stream_id, pts, dts, payload.len());
    // PCR 只出现在 PCR PID 的首包
    let pcr = (pid == PID_VIDEO).then(|| dts * PCR_PER_90K);
    let stuffing = TS_PAYLOAD_SIZE.saturating_sub(payload.len() + header.len());

    let mut packet = TsPacket::new(pid, true, counters.next(pid));
    if random_access || pcr.is_some() || stuffing > 0 {
        packet.add_adaptation_field(random_access, pcr, stuffing);
    }
    packet.write_payload(&header);
    let first = payload.split_to(payload.len().min(packet.remaining()));
    packet.write_payload(&first);
    io.write_all(packet.as_bytes())?;
    let mut packets = 1;

    while !payload.is_empty() {
        let mut packet = TsPacket::new(pid, false, counters.next(pid));
        if payload.len() < TS_PAYLOAD_SIZE {
            packet.add_adaptation_field(false, None, TS_PAYLOAD_SIZE - payload.len());
        }
        let chunk = payload.split_to(payload.len().min(packet.remaining()));
        packet.write_payload(&chunk);
        io.write_all(packet.as_bytes())?;
        packets += 1;
    }

    Ok(packets)
}
