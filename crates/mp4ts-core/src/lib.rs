//! # mp4ts-core
//!
//! mp4ts 核心库, 提供统一错误类型、CRC 校验和比特流读写工具.
//!
//! 容器解析与 TS 封装都建立在本 crate 之上.

pub mod bitreader;
pub mod bitwriter;
pub mod crc;
pub mod error;

// 重导出常用类型
pub use error::{Mp4TsError, Mp4TsResult};
