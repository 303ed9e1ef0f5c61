//! 采样数据改写.
//!
//! - 视频: 长度前缀 NAL → Annex-B 起始码, 前置 AUD, 关键帧前插入 SPS/PPS
//! - 音频: 原始 AAC 帧前加 7 字节 ADTS 头

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};
use mp4ts_core::bitwriter::BitWriter;
use mp4ts_core::{Mp4TsError, Mp4TsResult};

use crate::mp4::codec_config::{AacAudioConfig, AvcDecoderConfig};

/// 访问单元分隔符 NAL (含前后起始码)
pub const ACCESS_UNIT_DELIMITER: [u8; 10] = [0x00, 0x00, 0x00, 0x01, 0x09, 0xF0, 0x00, 0x00, 0x00, 0x01];
/// Annex-B 起始码
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];
/// ADTS 头长度 (无 CRC)
pub const ADTS_HEADER_SIZE: usize = 7;

/// AAC LC 对象类型
const AOT_LC: u8 = 2;
/// HE-AAC (SBR) 对象类型
const AOT_SBR: u8 = 5;
/// HE-AACv2 (PS) 对象类型
const AOT_PS: u8 = 29;

/// ADTS frame_length 字段上限 (13 位)
const ADTS_MAX_FRAME_LENGTH: usize = 0x1FFF;

/// 把一个 AVC 采样改写为 Annex-B 访问单元
///
/// 输出以 AUD 开头; 关键帧在第一个编码 NAL 之前插入全部 SPS 和 PPS.
/// NAL 长度与剩余数据不符时返回 [`Mp4TsError::Malformed`].
pub fn patch_avc_sample(
    sample: &[u8],
    config: &AvcDecoderConfig,
    sync_sample: bool,
) -> Mp4TsResult<Bytes> {
    let length_size = usize::from(config.nal_length_size);
    let parameter_sets_len: usize = if sync_sample {
        config
            .sps
            .iter()
            .chain(&config.pps)
            .map(|nal| nal.len() + START_CODE.len())
            .sum()
    } else {
        0
    };
    let mut out = BytesMut::with_capacity(ACCESS_UNIT_DELIMITER.len() + parameter_sets_len + sample.len());
    out.put_slice(&ACCESS_UNIT_DELIMITER);

    if sync_sample {
        for nal in config.sps.iter().chain(&config.pps) {
            out.put_slice(nal);
            out.put_slice(&START_CODE);
        }
    }

    let mut rest = sample;
    while !rest.is_empty() {
        if rest.len() < length_size {
            return Err(Mp4TsError::Malformed(format!(
                "NAL 长度前缀不完整: 剩余 {} 字节",
                rest.len()
            )));
        }
        let nal_len = BigEndian::read_uint(&rest[..length_size], length_size) as usize;
        rest = &rest[length_size..];
        if nal_len > rest.len() {
            return Err(Mp4TsError::Malformed(format!(
                "NAL 长度 {} 超过剩余数据 {}",
                nal_len,
                rest.len()
            )));
        }
        out.put_slice(&rest[..nal_len]);
        rest = &rest[nal_len..];
        if !rest.is_empty() {
            out.put_slice(&START_CODE);
        }
    }

    Ok(out.freeze())
}

/// 构建 7 字节 ADTS 头 (MPEG-4, 无 CRC)
pub fn build_adts_header(
    config: &AacAudioConfig,
    payload_len: usize,
) -> Mp4TsResult<[u8; ADTS_HEADER_SIZE]> {
    let frame_len = payload_len + ADTS_HEADER_SIZE;
    if frame_len > ADTS_MAX_FRAME_LENGTH {
        return Err(Mp4TsError::Malformed(format!(
            "AAC 帧长度超出 ADTS 限制: {}",
            frame_len
        )));
    }
    if config.sample_rate_index > 12 {
        log::warn!(
            "采样率索引 {} 不在 ADTS 标准表内, 按低 4 位写入",
            config.sample_rate_index
        );
    }

    let mut bw = BitWriter::with_capacity(ADTS_HEADER_SIZE);
    bw.write_bits(0xFFF, 12); // syncword
    bw.write_bits(0, 1); // ID: MPEG-4
    bw.write_bits(0, 2); // layer
    bw.write_bits(1, 1); // protection_absent
    bw.write_bits(u32::from(adts_profile(config.object_type)), 2);
    bw.write_bits(u32::from(config.sample_rate_index) & 0x0F, 4);
    bw.write_bits(0, 1); // private_bit
    bw.write_bits(u32::from(config.channel_config) & 0x07, 3);
    bw.write_bits(0, 4); // original/copy, home, copyright id bit/start
    bw.write_bits(frame_len as u32, 13);
    bw.write_bits(0x7FF, 11); // buffer fullness: VBR
    bw.write_bits(0, 2); // 1 个 raw data block

    let mut header = [0u8; ADTS_HEADER_SIZE];
    header.copy_from_slice(&bw.finish());
    Ok(header)
}

/// ADTS profile 字段 (2 位)
///
/// SBR (5) 与 PS (29) 以 LC 核心写入, 由解码器隐式识别扩展;
/// 其余为 `object_type - 1` 的低 2 位.
fn adts_profile(object_type: u8) -> u8 {
    match object_type {
        AOT_SBR | AOT_PS => AOT_LC - 1,
        other => other.wrapping_sub(1) & 0x03,
    }
}

/// 给原始 AAC 帧加上 ADTS 头
pub fn patch_aac_sample(sample: &[u8], config: &AacAudioConfig) -> Mp4TsResult<Bytes> {
    let header = build_adts_header(config, sample.len())?;
    let mut out = BytesMut::with_capacity(ADTS_HEADER_SIZE + sample.len());
    out.put_slice(&header);
    out.put_slice(sample);
    Ok(out.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn avc_config() -> AvcDecoderConfig {
        AvcDecoderConfig {
            profile_indication: 0x64,
            profile_compatibility: 0,
            level_indication: 0x1F,
            nal_length_size: 4,
            sps: vec![vec![0x67, 0x64, 0x00]],
            pps: vec![vec![0x68, 0xEE]],
        }
    }

    fn length_prefixed(nals: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for nal in nals {
            out.extend_from_slice(&(nal.len() as u32).to_be_bytes());
            out.extend_from_slice(nal);
        }
        out
    }

    #[test]
    fn test_关键帧插入参数集() {
        let sample = length_prefixed(&[&[0x65, 0x88, 0x84], &[0x65, 0x01]]);
        let out = patch_avc_sample(&sample, &avc_config(), true).unwrap();
        let expected: Vec<u8> = [
            &ACCESS_UNIT_DELIMITER[..],
            &[0x67, 0x64, 0x00],
            &START_CODE,
            &[0x68, 0xEE],
            &START_CODE,
            &[0x65, 0x88, 0x84],
            &START_CODE,
            &[0x65, 0x01],
        ]
        .concat();
        assert_eq!(&out[..], &expected[..]);
    }

    #[test]
    fn test_非关键帧不插入参数集() {
        let sample = length_prefixed(&[&[0x41, 0x9A]]);
        let out = patch_avc_sample(&sample, &avc_config(), false).unwrap();
        assert_eq!(&out[..], &[&ACCESS_UNIT_DELIMITER[..], &[0x41, 0x9A]].concat()[..]);
    }

    #[test]
    fn test_nal长度不符() {
        let mut sample = length_prefixed(&[&[0x41, 0x9A]]);
        sample[3] = 3;
        assert!(matches!(
            patch_avc_sample(&sample, &avc_config(), false),
            Err(Mp4TsError::Malformed(_))
        ));
        // 长度前缀被截断
        assert!(matches!(
            patch_avc_sample(&[0x00, 0x00], &avc_config(), false),
            Err(Mp4TsError::Malformed(_))
        ));
    }

    #[test]
    fn test_两字节长度前缀() {
        let mut config = avc_config();
        config.nal_length_size = 2;
        let out = patch_avc_sample(&[0x00, 0x02, 0x41, 0x9A], &config, false).unwrap();
        assert_eq!(&out[10..], &[0x41, 0x9A]);
    }

    #[test]
    fn test_adts头部() {
        let config = AacAudioConfig::from_audio_specific_config(&[0x12, 0x10]).unwrap();
        let header = build_adts_header(&config, 100).unwrap();
        assert_eq!(header[0], 0xFF);
        assert_eq!(header[1], 0xF1);
        assert_eq!(header[2], ((2 - 1) & 3) << 6 | (4 & 0xF) << 2 | (2 & 7) >> 2);
        assert_eq!(header[2], 0x50);
        // frame_length = 107
        assert_eq!(header, [0xFF, 0xF1, 0x50, 0x80, 0x0D, 0x7F, 0xFC]);
    }

    #[test]
    fn test_adts负载不变() {
        let config = AacAudioConfig::from_audio_specific_config(&[0x12, 0x10]).unwrap();
        let raw = [0x21, 0x10, 0x04, 0x60, 0x8C];
        let out = patch_aac_sample(&raw, &config).unwrap();
        assert_eq!(out.len(), 12);
        assert_eq!(&out[7..], &raw);
    }

    #[test]
    fn test_adts限制() {
        let config = AacAudioConfig::from_audio_specific_config(&[0x12, 0x10]).unwrap();
        assert!(matches!(
            build_adts_header(&config, 0x1FFF),
            Err(Mp4TsError::Malformed(_))
        ));
        assert!(build_adts_header(&config, 0x1FFF - 7).is_ok());
    }

    #[test]
    fn test_adts_he_aac_按lc写入() {
        let lc = AacAudioConfig::from_audio_specific_config(&[0x12, 0x10]).unwrap();
        let lc_header = build_adts_header(&lc, 100).unwrap();
        for object_type in [5, 29] {
            let mut he = lc.clone();
            he.object_type = object_type;
            assert_eq!(build_adts_header(&he, 100).unwrap(), lc_header);
        }
    }

    #[test]
    fn test_adts_其他对象类型取低两位() {
        let mut config = AacAudioConfig::from_audio_specific_config(&[0x12, 0x10]).unwrap();
        config.object_type = 1; // Main
        assert_eq!(build_adts_header(&config, 0).unwrap()[2] >> 6, 0);
        config.object_type = 4; // LTP
        assert_eq!(build_adts_header(&config, 0).unwrap()[2] >> 6, 3);
        config.object_type = 6; // Scalable
        assert_eq!(build_adts_header(&config, 0).unwrap()[2] >> 6, 1);
    }

    #[test]
    fn test_adts_声道配置按原值写入() {
        // channel_config=7 (7.1), 声道数映射为 8, ADTS 写入原始配置 7
        let config = AacAudioConfig::from_audio_specific_config(&[0x12, 0x38]).unwrap();
        assert_eq!(config.channel_config, 7);
        assert_eq!(config.channel_count, 8);
        let header = build_adts_header(&config, 0).unwrap();
        let channels = ((header[2] & 0x01) << 2) | (header[3] >> 6);
        assert_eq!(channels, 7);
    }
}
