//! 统一错误类型定义.
//!
//! 所有 mp4ts crate 共用的错误类型. 转换过程遇到任何错误都立即中止,
//! 不做局部恢复.

use thiserror::Error;

/// mp4ts 统一错误类型
#[derive(Debug, Error)]
pub enum Mp4TsError {
    /// 可用字节少于读取所需
    #[error("数据截断: 可用字节不足")]
    Truncated,

    /// Box 大小/偏移记账错误, 采样或块数越界, NAL 长度不符
    #[error("格式错误: {0}")]
    Malformed(String),

    /// 不支持的编解码器或容器特性
    #[error("不支持的编解码器: {0}")]
    UnsupportedCodec(String),

    /// 缺少必需的 box
    #[error("缺少必需的 box: {0}")]
    MissingRequiredBox(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),
}

/// mp4ts 统一 Result 类型
pub type Mp4TsResult<T> = Result<T, Mp4TsError>;
