//! # mp4ts
//!
//! 纯 Rust 实现的 MP4 → MPEG-2 TS 重封装器.
//!
//! 读取 H.264 视频与 AAC 音频的 MP4 文件, 不做任何重新编码,
//! 把压缩采样改写为 Annex-B / ADTS 后按解码时间交织写成 188 字节的 TS 包.
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use mp4ts::format::{IoContext, remux};
//!
//! let mut input = IoContext::open_read("input.mp4").unwrap();
//! let mut output = IoContext::open_write("result.ts").unwrap();
//! let stats = remux(&mut input, &mut output).unwrap();
//! println!("写出 {} 个 TS 包", stats.packets);
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `mp4ts-core` | 错误类型, CRC-32, 位读写 |
//! | `mp4ts-format` | MP4 解析与 TS 封装 |

/// 核心类型与工具
pub use mp4ts_core as core;

/// MP4 解析与 TS 封装
pub use mp4ts_format as format;

/// 获取版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
