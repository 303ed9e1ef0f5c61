//! 采样描述 (stsd) 解析.
//!
//! 每个轨道必须恰好有一个采样条目:
//! - 视频轨道: `avc1` VisualSampleEntry, 内含 `avcC`
//! - 音频轨道: `mp4a` AudioSampleEntry, 内含 `esds` (QuickTime 文件可能包在 `wave` 中)
//!
//! QuickTime 品牌的音频条目按 SoundDescription v1/v2 布局读取扩展字段.

use mp4ts_core::{Mp4TsError, Mp4TsResult};

use super::boxes::{BoxReader, BoxType};
use super::codec_config::{AacAudioConfig, AvcDecoderConfig, CodecConfig};
use super::movie::{HandlerType, ParseContext};

/// SoundDescription v2 中的固定常量字段
const SOUND_V2_CONSTANT: u32 = 0x7F00_0000;

/// 采样条目
#[derive(Debug, Clone, PartialEq)]
pub enum SampleEntry {
    /// 视频 (avc1)
    Video(VisualSampleEntry),
    /// 音频 (mp4a)
    Audio(AudioSampleEntry),
}

impl SampleEntry {
    /// 解析 stsd box, 返回唯一的采样条目
    pub fn parse_stsd(b: &mut BoxReader<'_>, ctx: ParseContext) -> Mp4TsResult<Self> {
        b.read_full_box_header()?;
        let entry_count = b.read_u32()?;
        if entry_count != 1 {
            return Err(Mp4TsError::UnsupportedCodec(format!(
                "stsd 条目数为 {}, 仅支持 1 个",
                entry_count
            )));
        }

        let mut entry = None;
        b.for_each_child(|child| {
            if entry.is_none() {
                entry = Some(Self::parse_entry(child, ctx)?);
            }
            Ok(())
        })?;
        entry.ok_or_else(|| Mp4TsError::MissingRequiredBox("stsd 采样条目".into()))
    }

    /// 解析单个采样条目 (SampleEntry 公共头 + 具体类型)
    fn parse_entry(b: &mut BoxReader<'_>, ctx: ParseContext) -> Mp4TsResult<Self> {
        let coding = b.box_type();
        b.skip(6)?; // reserved
        let data_reference_index = b.read_u16()?;

        match (ctx.handler, coding) {
            (HandlerType::Video, BoxType::Avc1) => Ok(Self::Video(VisualSampleEntry::parse(
                b,
                data_reference_index,
            )?)),
            (HandlerType::Audio, BoxType::Mp4a) => Ok(Self::Audio(AudioSampleEntry::parse(
                b,
                data_reference_index,
                ctx.quicktime,
            )?)),
            (HandlerType::Video, other) => Err(Mp4TsError::UnsupportedCodec(format!(
                "视频编码 {} 不受支持, 仅支持 avc1",
                other
            ))),
            (HandlerType::Audio, other) => Err(Mp4TsError::UnsupportedCodec(format!(
                "音频编码 {} 不受支持, 仅支持 mp4a",
                other
            ))),
            (HandlerType::Other(h), _) => Err(Mp4TsError::UnsupportedCodec(format!(
                "处理器类型 {} 没有可用的采样条目",
                super::boxes::fourcc_to_string(&h)
            ))),
        }
    }

    /// 采样条目的 FourCC 名称
    pub fn coding_name(&self) -> &'static str {
        match self {
            Self::Video(_) => "avc1",
            Self::Audio(_) => "mp4a",
        }
    }

    /// data_reference_index
    pub fn data_reference_index(&self) -> u16 {
        match self {
            Self::Video(v) => v.data_reference_index,
            Self::Audio(a) => a.data_reference_index,
        }
    }

    /// 编解码器配置
    pub fn codec_config(&self) -> CodecConfig<'_> {
        match self {
            Self::Video(v) => CodecConfig::Avc(&v.avc),
            Self::Audio(a) => CodecConfig::Aac(&a.aac),
        }
    }
}

/// 视觉采样条目 (avc1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisualSampleEntry {
    /// 数据引用索引
    pub data_reference_index: u16,
    /// 宽度 (像素)
    pub width: u16,
    /// 高度 (像素)
    pub height: u16,
    /// 水平分辨率 (16.16 dpi)
    pub horiz_resolution: u32,
    /// 垂直分辨率 (16.16 dpi)
    pub vert_resolution: u32,
    /// 每采样帧数 (固定为 1)
    pub frame_count: u16,
    /// 编码器名称
    pub compressor_name: String,
    /// 色深
    pub depth: u16,
    /// avcC 配置
    pub avc: AvcDecoderConfig,
}

impl VisualSampleEntry {
    fn parse(b: &mut BoxReader<'_>, data_reference_index: u16) -> Mp4TsResult<Self> {
        let _pre_defined = b.read_u16()?;
        let _reserved = b.read_u16()?;
        b.skip(12)?; // pre_defined[3]
        let width = b.read_u16()?;
        let height = b.read_u16()?;
        let horiz_resolution = b.read_u32()?;
        let vert_resolution = b.read_u32()?;
        let _reserved = b.read_u32()?;
        let frame_count = b.read_u16()?;
        if frame_count != 1 {
            return Err(Mp4TsError::Malformed(format!(
                "avc1 frame_count={}, 应为 1",
                frame_count
            )));
        }
        let compressor_name = b.read_fixed_string(32)?;
        let depth = b.read_u16()?;
        let _pre_defined = b.read_u16()?;

        let mut avc = None;
        b.for_each_child(|child| {
            if child.box_type() == BoxType::AvcC {
                avc = Some(AvcDecoderConfig::parse(child)?);
            }
            Ok(())
        })?;
        let avc = avc.ok_or_else(|| Mp4TsError::MissingRequiredBox("avcC".into()))?;

        log::debug!("avc1: {}x{}, 编码器 \"{}\"", width, height, compressor_name);

        Ok(Self {
            data_reference_index,
            width,
            height,
            horiz_resolution,
            vert_resolution,
            frame_count,
            compressor_name,
            depth,
            avc,
        })
    }
}

/// QuickTime SoundDescription 扩展字段
#[derive(Debug, Clone, PartialEq)]
pub enum QuickTimeSoundExtension {
    /// 版本 1
    V1 {
        /// 每包采样数
        samples_per_packet: u32,
        /// 每包字节数
        bytes_per_packet: u32,
        /// 每帧字节数
        bytes_per_frame: u32,
        /// 每采样字节数
        bytes_per_sample: u32,
    },
    /// 版本 2
    V2 {
        /// 结构体大小
        struct_size: u32,
        /// 采样率
        sample_rate: f64,
        /// 声道数
        channel_count: u32,
        /// 每声道位数
        bits_per_channel: u32,
        /// 格式标志
        format_flags: u32,
        /// 每包字节数
        bytes_per_packet: u32,
        /// 每包帧数
        frames_per_packet: u32,
    },
}

/// 音频采样条目 (mp4a)
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSampleEntry {
    /// 数据引用索引
    pub data_reference_index: u16,
    /// 条目版本 (ISO 文件恒为 0)
    pub version: u16,
    /// 修订号
    pub revision: u16,
    /// 厂商
    pub vendor: u32,
    /// 声道数
    pub channel_count: u16,
    /// 采样位数
    pub sample_size: u16,
    /// 采样率 (16.16 定点数的整数部分)
    pub sample_rate: u32,
    /// QuickTime 扩展字段
    pub quicktime: Option<QuickTimeSoundExtension>,
    /// esds 中的 AAC 配置
    pub aac: AacAudioConfig,
}

impl AudioSampleEntry {
    fn parse(b: &mut BoxReader<'_>, data_reference_index: u16, quicktime: bool) -> Mp4TsResult<Self> {
        let version = b.read_u16()?;
        let revision = b.read_u16()?;
        let vendor = b.read_u32()?;
        let channel_count = b.read_u16()?;
        let sample_size = b.read_u16()?;
        let _compression_id = b.read_u16()?;
        let _packet_size = b.read_u16()?;
        let sample_rate = b.read_u32()? >> 16;

        let extension = if quicktime {
            match version {
                1 => Some(QuickTimeSoundExtension::V1 {
                    samples_per_packet: b.read_u32()?,
                    bytes_per_packet: b.read_u32()?,
                    bytes_per_frame: b.read_u32()?,
                    bytes_per_sample: b.read_u32()?,
                }),
                2 => Some(Self::parse_sound_v2(b)?),
                _ => None,
            }
        } else {
            None
        };

        let mut aac = None;
        b.for_each_child(|child| {
            match child.box_type() {
                BoxType::Esds => aac = Some(AacAudioConfig::parse_esds(child)?),
                BoxType::Wave => child.for_each_child(|inner| {
                    if inner.box_type() == BoxType::Esds {
                        aac = Some(AacAudioConfig::parse_esds(inner)?);
                    }
                    Ok(())
                })?,
                _ => {}
            }
            Ok(())
        })?;
        let aac = aac.ok_or_else(|| Mp4TsError::MissingRequiredBox("esds".into()))?;

        log::debug!(
            "mp4a: {} 声道, {} Hz, 版本 {}",
            channel_count,
            sample_rate,
            version
        );

        Ok(Self {
            data_reference_index,
            version,
            revision,
            vendor,
            channel_count,
            sample_size,
            sample_rate,
            quicktime: extension,
            aac,
        })
    }

    fn parse_sound_v2(b: &mut BoxReader<'_>) -> Mp4TsResult<QuickTimeSoundExtension> {
        let struct_size = b.read_u32()?;
        let sample_rate = f64::from_bits(b.read_u64()?);
        let channel_count = b.read_u32()?;
        let constant = b.read_u32()?;
        if constant != SOUND_V2_CONSTANT {
            return Err(Mp4TsError::Malformed(format!(
                "SoundDescription v2 常量字段为 0x{:08X}, 应为 0x7F000000",
                constant
            )));
        }
        Ok(QuickTimeSoundExtension::V2 {
            struct_size,
            sample_rate,
            channel_count,
            bits_per_channel: b.read_u32()?,
            format_flags: b.read_u32()?,
            bytes_per_packet: b.read_u32()?,
            frames_per_packet: b.read_u32()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::IoContext;
    use crate::mp4::boxes::BoxArena;

    fn build_box(tag: &[u8; 4], content: &[u8]) -> Vec<u8> {
        let mut data = ((8 + content.len()) as u32).to_be_bytes().to_vec();
        data.extend_from_slice(tag);
        data.extend_from_slice(content);
        data
    }

    fn build_stsd(entries: &[Vec<u8>]) -> Vec<u8> {
        let mut content = vec![0, 0, 0, 0];
        content.extend_from_slice(&(entries.len() as u32).to_be_bytes());
        for e in entries {
            content.extend_from_slice(e);
        }
        build_box(b"stsd", &content)
    }

    fn build_avc1(with_avcc: bool) -> Vec<u8> {
        let mut c = vec![0u8; 6];
        c.extend_from_slice(&1u16.to_be_bytes());
        c.extend_from_slice(&[0u8; 16]);
        c.extend_from_slice(&320u16.to_be_bytes());
        c.extend_from_slice(&240u16.to_be_bytes());
        c.extend_from_slice(&0x0048_0000u32.to_be_bytes());
        c.extend_from_slice(&0x0048_0000u32.to_be_bytes());
        c.extend_from_slice(&0u32.to_be_bytes());
        c.extend_from_slice(&1u16.to_be_bytes());
        let mut name = [0u8; 32];
        name[0] = 4;
        name[1..5].copy_from_slice(b"test");
        c.extend_from_slice(&name);
        c.extend_from_slice(&0x18u16.to_be_bytes());
        c.extend_from_slice(&0xFFFFu16.to_be_bytes());
        c.extend_from_slice(&build_box(b"btrt", &[0u8; 12]));
        if with_avcc {
            c.extend_from_slice(&build_box(
                b"avcC",
                &[0x01, 0x64, 0x00, 0x1F, 0xFF, 0xE1, 0x00, 0x02, 0x67, 0x64, 0x01, 0x00, 0x01, 0x68],
            ));
        }
        build_box(b"avc1", &c)
    }

    fn build_mp4a(version: u16, tail: &[u8], children: &[u8]) -> Vec<u8> {
        let mut c = vec![0u8; 6];
        c.extend_from_slice(&1u16.to_be_bytes());
        c.extend_from_slice(&version.to_be_bytes());
        c.extend_from_slice(&0u16.to_be_bytes());
        c.extend_from_slice(&0u32.to_be_bytes());
        c.extend_from_slice(&2u16.to_be_bytes());
        c.extend_from_slice(&16u16.to_be_bytes());
        c.extend_from_slice(&0u16.to_be_bytes());
        c.extend_from_slice(&0u16.to_be_bytes());
        c.extend_from_slice(&(44100u32 << 16).to_be_bytes());
        c.extend_from_slice(tail);
        c.extend_from_slice(children);
        build_box(b"mp4a", &c)
    }

    fn build_esds() -> Vec<u8> {
        let content = [
            0, 0, 0, 0, // version + flags
            0x03, 0x19, 0x00, 0x01, 0x00, // ES_Descriptor
            0x04, 0x11, 0x40, 0x15, 0x00, 0x00, 0x00, 0x00, 0x01, 0xF4, 0x00, 0x00, 0x01, 0xF4,
            0x00, // DecoderConfigDescriptor
            0x05, 0x02, 0x12, 0x10, // AudioSpecificConfig
            0x06, 0x01, 0x02, // SLConfigDescriptor
        ];
        build_box(b"esds", &content)
    }

    fn parse_stsd(data: Vec<u8>, ctx: ParseContext) -> Mp4TsResult<SampleEntry> {
        let mut io = IoContext::from_memory(data);
        let mut arena = BoxArena::new();
        let mut b = BoxReader::next_top_level(&mut io, &mut arena)?.ok_or(Mp4TsError::Truncated)?;
        SampleEntry::parse_stsd(&mut b, ctx)
    }

    fn video_ctx() -> ParseContext {
        ParseContext {
            handler: HandlerType::Video,
            quicktime: false,
        }
    }

    fn audio_ctx(quicktime: bool) -> ParseContext {
        ParseContext {
            handler: HandlerType::Audio,
            quicktime,
        }
    }

    #[test]
    fn test_avc1_解析() {
        let entry = parse_stsd(build_stsd(&[build_avc1(true)]), video_ctx()).unwrap();
        let SampleEntry::Video(v) = &entry else {
            panic!("应为视频条目");
        };
        assert_eq!(v.width, 320);
        assert_eq!(v.height, 240);
        assert_eq!(v.compressor_name, "test");
        assert_eq!(v.depth, 0x18);
        assert_eq!(v.avc.sps, vec![vec![0x67, 0x64]]);
        assert_eq!(v.avc.pps, vec![vec![0x68]]);
        assert_eq!(entry.coding_name(), "avc1");
        assert_eq!(entry.data_reference_index(), 1);
        assert!(matches!(entry.codec_config(), CodecConfig::Avc(_)));
    }

    #[test]
    fn test_avc1_缺少avcc() {
        let err = parse_stsd(build_stsd(&[build_avc1(false)]), video_ctx()).unwrap_err();
        assert!(matches!(err, Mp4TsError::MissingRequiredBox(_)));
    }

    #[test]
    fn test_多个条目不支持() {
        let err = parse_stsd(
            build_stsd(&[build_avc1(true), build_avc1(true)]),
            video_ctx(),
        )
        .unwrap_err();
        assert!(matches!(err, Mp4TsError::UnsupportedCodec(_)));
    }

    #[test]
    fn test_非avc视频不支持() {
        let mut hvc1 = build_avc1(true);
        hvc1[4..8].copy_from_slice(b"hvc1");
        let err = parse_stsd(build_stsd(&[hvc1]), video_ctx()).unwrap_err();
        assert!(matches!(err, Mp4TsError::UnsupportedCodec(_)));
    }

    #[test]
    fn test_mp4a_解析() {
        let entry = parse_stsd(
            build_stsd(&[build_mp4a(0, &[], &build_esds())]),
            audio_ctx(false),
        )
        .unwrap();
        let SampleEntry::Audio(a) = &entry else {
            panic!("应为音频条目");
        };
        assert_eq!(a.channel_count, 2);
        assert_eq!(a.sample_size, 16);
        assert_eq!(a.sample_rate, 44100);
        assert!(a.quicktime.is_none());
        assert_eq!(a.aac.object_type, 2);
        assert_eq!(a.aac.sample_rate_index, 4);
        assert_eq!(a.aac.channel_config, 2);
    }

    #[test]
    fn test_quicktime_v1_wave中的esds() {
        let mut tail = Vec::new();
        for v in [1024u32, 0, 2, 2] {
            tail.extend_from_slice(&v.to_be_bytes());
        }
        let wave = build_box(b"wave", &[build_box(b"frma", b"mp4a"), build_esds()].concat());
        let entry = parse_stsd(build_stsd(&[build_mp4a(1, &tail, &wave)]), audio_ctx(true)).unwrap();
        let SampleEntry::Audio(a) = entry else {
            panic!("应为音频条目");
        };
        assert_eq!(
            a.quicktime,
            Some(QuickTimeSoundExtension::V1 {
                samples_per_packet: 1024,
                bytes_per_packet: 0,
                bytes_per_frame: 2,
                bytes_per_sample: 2,
            })
        );
        assert_eq!(a.aac.sample_rate, 44100);
    }

    #[test]
    fn test_quicktime_v2_常量校验() {
        let mut tail = Vec::new();
        tail.extend_from_slice(&72u32.to_be_bytes());
        tail.extend_from_slice(&48000f64.to_bits().to_be_bytes());
        tail.extend_from_slice(&2u32.to_be_bytes());
        tail.extend_from_slice(&0x7F00_0000u32.to_be_bytes());
        for v in [16u32, 0, 0, 1024] {
            tail.extend_from_slice(&v.to_be_bytes());
        }
        let entry =
            parse_stsd(build_stsd(&[build_mp4a(2, &tail, &build_esds())]), audio_ctx(true)).unwrap();
        let SampleEntry::Audio(a) = entry else {
            panic!("应为音频条目");
        };
        assert!(matches!(
            a.quicktime,
            Some(QuickTimeSoundExtension::V2 { sample_rate, frames_per_packet: 1024, .. })
                if sample_rate == 48000.0
        ));

        tail[16..20].copy_from_slice(&0u32.to_be_bytes());
        let err = parse_stsd(build_stsd(&[build_mp4a(2, &tail, &build_esds())]), audio_ctx(true))
            .unwrap_err();
        assert!(matches!(err, Mp4TsError::Malformed(_)));
    }

    #[test]
    fn test_mp4a_缺少esds() {
        let err = parse_stsd(build_stsd(&[build_mp4a(0, &[], &[])]), audio_ctx(false)).unwrap_err();
        assert!(matches!(err, Mp4TsError::MissingRequiredBox(_)));
    }
}
