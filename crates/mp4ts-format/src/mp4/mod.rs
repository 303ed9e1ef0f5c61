//! MP4 (ISO Base Media File Format) 解析.
//!
//! 一次性读取 box 树, 提取轨道元数据、编解码器配置和采样表,
//! 再由采样定位与时间戳计算把采样索引映射到文件字节和 90 kHz 时间.
//! 采样数据本身不在解析阶段读取.

pub mod boxes;
pub mod codec_config;
pub mod locator;
pub mod movie;
pub mod sample_description;
pub mod sample_table;
pub mod timing;

pub use boxes::{BoxArena, BoxNode, BoxReader, BoxType, NodeId};
pub use codec_config::{AacAudioConfig, AvcDecoderConfig, CodecConfig};
pub use locator::{SampleIndex, SampleLocation, locate_sample};
pub use movie::{HandlerType, Mp4File, MovieBox, ParseContext, TrackBox};
pub use sample_description::SampleEntry;
pub use sample_table::SampleTableBox;
pub use timing::{SampleTime, TS_CLOCK_HZ, Timeline, rescale_90k, sample_timestamps};
