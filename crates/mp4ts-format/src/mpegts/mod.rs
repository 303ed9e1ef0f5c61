//! MPEG-2 TS 封装.
//!
//! - [`psi`]: 固定的 PAT/PMT 包
//! - [`packet`]: 188 字节 TS 包与适配字段
//! - [`pes`]: PES 头部与访问单元分包
//! - [`payload`]: 采样数据改写 (Annex-B / ADTS)

pub mod packet;
pub mod payload;
pub mod pes;
pub mod psi;

/// TS 包大小
pub const TS_PACKET_SIZE: usize = 188;
/// TS 包头之后的可用字节数
pub const TS_PAYLOAD_SIZE: usize = TS_PACKET_SIZE - 4;
/// TS 同步字节
pub const TS_SYNC_BYTE: u8 = 0x47;

/// PAT PID
pub const PID_PAT: u16 = 0x0000;
/// PMT PID
pub const PID_PMT: u16 = 0x0FFF;
/// 视频 (兼 PCR) PID; 只有一条轨道时音频也使用它
pub const PID_VIDEO: u16 = 0x0100;
/// 音视频同时存在时的音频 PID
pub const PID_AUDIO: u16 = 0x0101;

/// 视频 PES stream_id
pub const STREAM_ID_VIDEO: u8 = 0xE0;
/// 音频 PES stream_id
pub const STREAM_ID_AUDIO: u8 = 0xC0;

pub use packet::{ContinuityCounters, TsPacket};
pub use pes::{AccessUnit, write_access_unit};
pub use psi::{PAT_PACKET, StreamLayout};
