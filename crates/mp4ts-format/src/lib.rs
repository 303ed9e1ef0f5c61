//! # mp4ts-format
//!
//! MP4 (ISO BMFF) 解析与 MPEG-TS 重封装.
//!
//! 解析阶段一次性读取 box 树并建立采样索引, 封装阶段按解码时间交织音视频采样,
//! 逐个读取、改写并切分为 188 字节的 TS 包写出. 不做任何重新编码.

pub mod io;
pub mod mp4;
pub mod mpegts;
pub mod remux;

// 重导出常用类型
pub use io::{IoBackend, IoContext, MemoryBackend};
pub use mp4::Mp4File;
pub use remux::{Mp4ToTs, RemuxStats, Schedule, TrackKind, remux};
