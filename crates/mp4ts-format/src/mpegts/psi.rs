//! 固定的 PAT/PMT 包.
//!
//! 节目结构只有三种可能 (仅视频, 仅音频, 音视频), 因此 PSI 不在运行时生成,
//! 而是预先写好的完整 188 字节包, CRC-32 已经算好.
//! 所有包的连续性计数器都是 0, 每个文件各写一次.
//!
//! 节目号 1, PMT PID 0x0FFF, PCR PID 恒为 0x0100.

use super::TS_PACKET_SIZE;

/// 用 0xFF 把前缀补齐为一个 TS 包
const fn pad_to_packet(prefix: &[u8]) -> [u8; TS_PACKET_SIZE] {
    let mut packet = [0xFF; TS_PACKET_SIZE];
    let mut i = 0;
    while i < prefix.len() {
        packet[i] = prefix[i];
        i += 1;
    }
    packet
}

/// PAT: 节目 1 → PMT PID 0x0FFF
pub const PAT_PACKET: [u8; TS_PACKET_SIZE] = pad_to_packet(&[
    0x47, 0x40, 0x00, 0x10, // TS 头: PID 0, PUSI, 仅负载, CC 0
    0x00, // pointer_field
    0x00, 0xB0, 0x0D, // table_id, section_length = 13
    0x00, 0x01, 0xC1, 0x00, 0x00, // transport_stream_id, version/current, section 0/0
    0x00, 0x01, 0xEF, 0xFF, // program_number 1 → PID 0x0FFF
    0x36, 0x90, 0xE2, 0x3D, // CRC-32
]);

/// PMT: H.264 @ 0x0100 + AAC @ 0x0101
pub const PMT_VIDEO_AUDIO_PACKET: [u8; TS_PACKET_SIZE] = pad_to_packet(&[
    0x47, 0x4F, 0xFF, 0x10, // TS 头: PID 0x0FFF, PUSI, 仅负载, CC 0
    0x00, // pointer_field
    0x02, 0xB0, 0x17, // table_id, section_length = 23
    0x00, 0x01, 0xC1, 0x00, 0x00, // program_number, version/current, section 0/0
    0xE1, 0x00, 0xF0, 0x00, // PCR_PID 0x0100, program_info_length 0
    0x1B, 0xE1, 0x00, 0xF0, 0x00, // H.264 @ 0x0100
    0x0F, 0xE1, 0x01, 0xF0, 0x00, // AAC ADTS @ 0x0101
    0x2F, 0x44, 0xB9, 0x9B, // CRC-32
]);

/// PMT: 仅 H.264 @ 0x0100
pub const PMT_VIDEO_PACKET: [u8; TS_PACKET_SIZE] = pad_to_packet(&[
    0x47, 0x4F, 0xFF, 0x10, //
    0x00, //
    0x02, 0xB0, 0x12, // section_length = 18
    0x00, 0x01, 0xC1, 0x00, 0x00, //
    0xE1, 0x00, 0xF0, 0x00, //
    0x1B, 0xE1, 0x00, 0xF0, 0x00, // H.264 @ 0x0100
    0x15, 0xBD, 0x4D, 0x56, // CRC-32
]);

/// PMT: 仅 AAC @ 0x0100
pub const PMT_AUDIO_PACKET: [u8; TS_PACKET_SIZE] = pad_to_packet(&[
    0x47, 0x4F, 0xFF, 0x10, //
    0x00, //
    0x02, 0xB0, 0x12, // section_length = 18
    0x00, 0x01, 0xC1, 0x00, 0x00, //
    0xE1, 0x00, 0xF0, 0x00, //
    0x0F, 0xE1, 0x00, 0xF0, 0x00, // AAC ADTS @ 0x0100
    0xB6, 0x9B, 0xC0, 0xD9, // CRC-32
]);

/// 节目中的基本流组合
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamLayout {
    /// 仅视频
    VideoOnly,
    /// 仅音频
    AudioOnly,
    /// 音视频
    VideoAudio,
}

impl StreamLayout {
    /// 由轨道是否存在推出组合, 两者皆无时返回 `None`
    pub fn from_tracks(has_video: bool, has_audio: bool) -> Option<Self> {
        match (has_video, has_audio) {
            (true, true) => Some(Self::VideoAudio),
            (true, false) => Some(Self::VideoOnly),
            (false, true) => Some(Self::AudioOnly),
            (false, false) => None,
        }
    }
}

/// 选择与流组合对应的 PMT 包
pub fn pmt_packet(layout: StreamLayout) -> &'static [u8; TS_PACKET_SIZE] {
    match layout {
        StreamLayout::VideoOnly => &PMT_VIDEO_PACKET,
        StreamLayout::AudioOnly => &PMT_AUDIO_PACKET,
        StreamLayout::VideoAudio => &PMT_VIDEO_AUDIO_PACKET,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mp4ts_core::crc::crc32_mpeg2;

    /// 校验 section (table_id 到 CRC 之前) 的 CRC 与包内一致
    fn assert_section_crc(packet: &[u8; TS_PACKET_SIZE]) {
        let section_length = (usize::from(packet[6] & 0x0F) << 8) | usize::from(packet[7]);
        let end = 5 + 3 + section_length;
        let crc = crc32_mpeg2(&packet[5..end - 4]);
        assert_eq!(crc.to_be_bytes(), packet[end - 4..end]);
        assert!(packet[end..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_psi_crc校验() {
        assert_section_crc(&PAT_PACKET);
        assert_section_crc(&PMT_VIDEO_AUDIO_PACKET);
        assert_section_crc(&PMT_VIDEO_PACKET);
        assert_section_crc(&PMT_AUDIO_PACKET);
    }

    #[test]
    fn test_整段crc为零() {
        // 含 CRC 的整段再算一次 CRC 结果为 0
        assert_eq!(crc32_mpeg2(&PAT_PACKET[5..21]), 0);
    }

    #[test]
    fn test_pmt选择() {
        assert_eq!(
            StreamLayout::from_tracks(true, true),
            Some(StreamLayout::VideoAudio)
        );
        assert_eq!(StreamLayout::from_tracks(false, false), None);
        assert_eq!(pmt_packet(StreamLayout::AudioOnly)[17], 0x0F);
        assert_eq!(pmt_packet(StreamLayout::VideoOnly)[17], 0x1B);
        assert_eq!(pmt_packet(StreamLayout::VideoAudio)[22], 0x0F);
        for layout in [
            StreamLayout::VideoOnly,
            StreamLayout::AudioOnly,
            StreamLayout::VideoAudio,
        ] {
            let pmt = pmt_packet(layout);
            assert_eq!(pmt[0], 0x47);
            // PID 0x0FFF
            assert_eq!(((u16::from(pmt[1]) & 0x1F) << 8) | u16::from(pmt[2]), 0x0FFF);
        }
    }
}
