//! 编解码器配置解析.
//!
//! - avcC: AVCDecoderConfigurationRecord (ISO 14496-15), 提供 SPS/PPS
//! - esds: ES_Descriptor → DecoderConfigDescriptor → DecoderSpecificInfo
//!   (ISO 14496-1), 其中的 AudioSpecificConfig 决定 ADTS 头字段

use mp4ts_core::bitreader::BitReader;
use mp4ts_core::{Mp4TsError, Mp4TsResult};

use super::boxes::BoxReader;

/// ES_Descriptor 标签
const ES_DESCRIPTOR_TAG: u8 = 0x03;
/// DecoderConfigDescriptor 标签
const DECODER_CONFIG_DESCRIPTOR_TAG: u8 = 0x04;
/// DecoderSpecificInfo 标签
const DECODER_SPECIFIC_INFO_TAG: u8 = 0x05;

/// AAC 采样率表 (按 sampling_frequency_index)
pub const SAMPLE_RATE_TABLE: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// channel_configuration → 实际声道数
const CHANNEL_COUNT_TABLE: [u8; 8] = [0, 1, 2, 3, 4, 5, 6, 8];

/// 采样率索引的转义值, 其后跟 24-bit 显式采样率
const SAMPLE_RATE_INDEX_ESCAPE: u8 = 0x0F;

/// 编解码器配置 (借用自采样条目)
#[derive(Debug, Clone, Copy)]
pub enum CodecConfig<'a> {
    /// H.264/AVC 参数集
    Avc(&'a AvcDecoderConfig),
    /// AAC AudioSpecificConfig
    Aac(&'a AacAudioConfig),
}

/// AVC 解码器配置 (avcC)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcDecoderConfig {
    /// AVCProfileIndication
    pub profile_indication: u8,
    /// profile_compatibility
    pub profile_compatibility: u8,
    /// AVCLevelIndication
    pub level_indication: u8,
    /// NAL 长度字段字节数 (lengthSizeMinusOne + 1)
    pub nal_length_size: u8,
    /// 序列参数集
    pub sps: Vec<Vec<u8>>,
    /// 图像参数集
    pub pps: Vec<Vec<u8>>,
}

impl AvcDecoderConfig {
    /// 解析 avcC box 内容
    pub fn parse(b: &mut BoxReader<'_>) -> Mp4TsResult<Self> {
        let version = b.read_u8()?;
        if version != 1 {
            return Err(Mp4TsError::UnsupportedCodec(format!(
                "avcC configurationVersion={}, 仅支持 1",
                version
            )));
        }
        let profile_indication = b.read_u8()?;
        let profile_compatibility = b.read_u8()?;
        let level_indication = b.read_u8()?;
        let nal_length_size = (b.read_u8()? & 0x03) + 1;

        let sps_count = b.read_u8()? & 0x1F;
        let mut sps = Vec::with_capacity(sps_count as usize);
        for _ in 0..sps_count {
            let len = b.read_u16()?;
            sps.push(b.read_bytes(len as usize)?);
        }

        let pps_count = b.read_u8()?;
        let mut pps = Vec::with_capacity(pps_count as usize);
        for _ in 0..pps_count {
            let len = b.read_u16()?;
            pps.push(b.read_bytes(len as usize)?);
        }

        log::debug!(
            "avcC: profile={}, level={}, SPS {} 个, PPS {} 个",
            profile_indication,
            level_indication,
            sps.len(),
            pps.len()
        );

        Ok(Self {
            profile_indication,
            profile_compatibility,
            level_indication,
            nal_length_size,
            sps,
            pps,
        })
    }
}

/// AAC 音频配置 (esds 中的 AudioSpecificConfig 及描述符字段)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AacAudioConfig {
    /// ES_ID
    pub es_id: u16,
    /// objectTypeIndication (0x40 = MPEG-4 Audio)
    pub object_type_indication: u8,
    /// bufferSizeDB
    pub buffer_size: u32,
    /// maxBitrate
    pub max_bitrate: u32,
    /// avgBitrate
    pub avg_bitrate: u32,
    /// audioObjectType (2 = AAC-LC)
    pub object_type: u8,
    /// samplingFrequencyIndex
    pub sample_rate_index: u8,
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// channelConfiguration (原始值, 写入 ADTS)
    pub channel_config: u8,
    /// 实际声道数
    pub channel_count: u8,
}

impl AacAudioConfig {
    /// 解析 esds box 内容
    pub fn parse_esds(b: &mut BoxReader<'_>) -> Mp4TsResult<Self> {
        b.read_full_box_header()?;

        let (tag, _) = read_descriptor_header(b)?;
        let es_id = b.read_u16()?;
        if tag == ES_DESCRIPTOR_TAG {
            let flags = b.read_u8()?;
            if flags & 0x80 != 0 {
                b.skip(2)?; // dependsOn_ES_ID
            }
            if flags & 0x40 != 0 {
                let url_len = b.read_u8()?;
                b.skip(u64::from(url_len))?;
            }
            if flags & 0x20 != 0 {
                b.skip(2)?; // OCR_ES_Id
            }
        }

        let (tag, _) = read_descriptor_header(b)?;
        if tag != DECODER_CONFIG_DESCRIPTOR_TAG {
            return Err(Mp4TsError::UnsupportedCodec(format!(
                "esds 缺少 DecoderConfigDescriptor, 遇到标签 0x{:02X}",
                tag
            )));
        }
        let object_type_indication = b.read_u8()?;
        let _stream_type = b.read_u8()?;
        let buffer_size = b.read_u24()?;
        let max_bitrate = b.read_u32()?;
        let avg_bitrate = b.read_u32()?;

        let (tag, len) = read_descriptor_header(b)?;
        if tag != DECODER_SPECIFIC_INFO_TAG {
            return Err(Mp4TsError::UnsupportedCodec(format!(
                "esds 缺少 AudioSpecificConfig, 遇到标签 0x{:02X}",
                tag
            )));
        }
        let asc = b.read_bytes(len as usize)?;
        let mut config = Self::from_audio_specific_config(&asc)?;
        config.es_id = es_id;
        config.object_type_indication = object_type_indication;
        config.buffer_size = buffer_size;
        config.max_bitrate = max_bitrate;
        config.avg_bitrate = avg_bitrate;
        Ok(config)
    }

    /// 从 AudioSpecificConfig 字节解析
    ///
    /// 描述符相关字段置零.
    pub fn from_audio_specific_config(data: &[u8]) -> Mp4TsResult<Self> {
        let mut br = BitReader::new(data);
        let object_type = br.read_bits(5)? as u8;
        let sample_rate_index = br.read_bits(4)? as u8;
        let sample_rate = if sample_rate_index == SAMPLE_RATE_INDEX_ESCAPE {
            br.read_bits(24)?
        } else {
            SAMPLE_RATE_TABLE
                .get(sample_rate_index as usize)
                .copied()
                .ok_or_else(|| {
                    Mp4TsError::UnsupportedCodec(format!(
                        "AAC 采样率索引无效: {}",
                        sample_rate_index
                    ))
                })?
        };
        let channel_config = br.read_bits(4)? as u8;
        let channel_count = CHANNEL_COUNT_TABLE
            .get(channel_config as usize)
            .copied()
            .unwrap_or(channel_config);

        log::debug!(
            "AudioSpecificConfig: object_type={}, {} Hz (index={}), channel_config={}",
            object_type,
            sample_rate,
            sample_rate_index,
            channel_config
        );

        Ok(Self {
            es_id: 0,
            object_type_indication: 0,
            buffer_size: 0,
            max_bitrate: 0,
            avg_bitrate: 0,
            object_type,
            sample_rate_index,
            sample_rate,
            channel_config,
            channel_count,
        })
    }
}

/// 读取 MPEG-4 描述符头: 标签 + 可变长度
///
/// 长度最多 4 字节, 每字节低 7 位为值, 高位为续标志.
fn read_descriptor_header(b: &mut BoxReader<'_>) -> Mp4TsResult<(u8, u32)> {
    let tag = b.read_u8()?;
    let mut len = 0u32;
    for _ in 0..4 {
        let byte = b.read_u8()?;
        len = (len << 7) | u32::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            break;
        }
    }
    Ok((tag, len))
}
