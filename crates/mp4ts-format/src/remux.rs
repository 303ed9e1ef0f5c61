//! MP4 → MPEG-TS 重封装.
//!
//! 只使用影片中的第一个视频轨道和第一个音频轨道. 两者都存在时视频走 PID 0x0100,
//! 音频走 PID 0x0101; 只有一个时它使用 PID 0x0100.
//!
//! 输出顺序: PAT, PMT, 然后按解码时间交织的 PES 包. 解码时间相同时视频优先.

use std::fmt;
use std::io::SeekFrom;

use mp4ts_core::{Mp4TsError, Mp4TsResult};

use crate::io::IoContext;
use crate::mp4::codec_config::CodecConfig;
use crate::mp4::locator::SampleIndex;
use crate::mp4::movie::{MovieBox, Mp4File, TrackBox};
use crate::mp4::sample_description::SampleEntry;
use crate::mp4::timing::Timeline;
use crate::mpegts::packet::ContinuityCounters;
use crate::mpegts::payload::{patch_aac_sample, patch_avc_sample};
use crate::mpegts::pes::{AccessUnit, write_access_unit};
use crate::mpegts::psi::{PAT_PACKET, StreamLayout, pmt_packet};
use crate::mpegts::{PID_AUDIO, PID_VIDEO, STREAM_ID_AUDIO, STREAM_ID_VIDEO, TS_PACKET_SIZE};

/// 轨道种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    /// 视频
    Video,
    /// 音频
    Audio,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "视频"),
            Self::Audio => write!(f, "音频"),
        }
    }
}

// ========================
// 基本流
// ========================

/// 参与转换的一条基本流
///
/// 持有预先算好的采样位置索引和 90 kHz 时间线.
pub struct ElementaryStream<'a> {
    kind: TrackKind,
    pid: u16,
    stream_id: u8,
    track: &'a TrackBox,
    index: SampleIndex,
    timeline: Timeline,
}

impl<'a> ElementaryStream<'a> {
    fn new(kind: TrackKind, track: &'a TrackBox, pid: u16) -> Mp4TsResult<Self> {
        let table = track.sample_table();
        let index = SampleIndex::build(table)?;
        let timeline = Timeline::build(table, track.timescale())?;
        let stream_id = match table.sample_entry {
            SampleEntry::Video(_) => STREAM_ID_VIDEO,
            SampleEntry::Audio(_) => STREAM_ID_AUDIO,
        };
        log::debug!(
            "{}轨道 {}: PID 0x{:04X}, {} 个采样",
            kind,
            track.tkhd.track_id,
            pid,
            index.len()
        );
        Ok(Self {
            kind,
            pid,
            stream_id,
            track,
            index,
            timeline,
        })
    }

    /// 轨道种类
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// TS PID
    pub fn pid(&self) -> u16 {
        self.pid
    }

    /// PES stream_id
    pub fn stream_id(&self) -> u8 {
        self.stream_id
    }

    /// 来源轨道
    pub fn track(&self) -> &'a TrackBox {
        self.track
    }

    /// 采样数
    pub fn sample_count(&self) -> u32 {
        self.index.len() as u32
    }

    /// 90 kHz 时间线
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// 读取一个采样并改写为访问单元
    pub fn access_unit(&self, input: &mut IoContext, sample: u32) -> Mp4TsResult<AccessUnit> {
        let location = self
            .index
            .get(sample)
            .ok_or_else(|| Mp4TsError::Malformed(format!("采样 {} 不在索引中", sample)))?;
        let time = self
            .timeline
            .get(sample)
            .ok_or_else(|| Mp4TsError::Malformed(format!("采样 {} 没有时间戳", sample)))?;

        input.seek(SeekFrom::Start(location.offset))?;
        let raw = input.read_bytes(location.size as usize)?;

        let table = self.track.sample_table();
        let random_access = table.is_sync_sample(sample);
        let payload = match table.sample_entry.codec_config() {
            CodecConfig::Avc(avc) => patch_avc_sample(&raw, avc, random_access)?,
            CodecConfig::Aac(aac) => patch_aac_sample(&raw, aac)?,
        };

        log::trace!(
            "{} 采样 {}: @{} {} 字节, dts={}, pts={}",
            self.kind,
            sample,
            location.offset,
            location.size,
            time.dts,
            time.pts
        );
        Ok(AccessUnit {
            pid: self.pid,
            stream_id: self.stream_id,
            pts: time.pts,
            dts: time.dts,
            random_access,
            payload,
        })
    }
}

// ========================
// 交织调度
// ========================

/// 单条轨道的游标
struct Cursor<'t> {
    timeline: &'t Timeline,
    next: u32,
}

impl Cursor<'_> {
    /// 下一个采样的解码时间, 已耗尽时返回 `None`
    fn peek(&self) -> Option<u64> {
        self.timeline.get(self.next).map(|t| t.dts)
    }
}

/// 按解码时间交织两条轨道的采样
///
/// 产出 `(轨道种类, 采样索引)`. 视频未耗尽且 (音频已耗尽或视频 DTS ≤ 音频 DTS)
/// 时取视频, 否则取音频. 只有一条轨道时按索引顺序产出全部采样.
pub struct Schedule<'t> {
    video: Option<Cursor<'t>>,
    audio: Option<Cursor<'t>>,
}

impl<'t> Schedule<'t> {
    /// 从两条时间线创建调度器
    pub fn new(video: Option<&'t Timeline>, audio: Option<&'t Timeline>) -> Self {
        let cursor = |timeline| Cursor { timeline, next: 0 };
        Self {
            video: video.map(cursor),
            audio: audio.map(cursor),
        }
    }
}

impl Iterator for Schedule<'_> {
    type Item = (TrackKind, u32);

    fn next(&mut self) -> Option<Self::Item> {
        let video_dts = self.video.as_ref().and_then(Cursor::peek);
        let audio_dts = self.audio.as_ref().and_then(Cursor::peek);
        let (kind, cursor) = match (video_dts, audio_dts) {
            (Some(v), Some(a)) if v > a => (TrackKind::Audio, self.audio.as_mut()?),
            (Some(_), _) => (TrackKind::Video, self.video.as_mut()?),
            (None, Some(_)) => (TrackKind::Audio, self.audio.as_mut()?),
            (None, None) => return None,
        };
        let sample = cursor.next;
        cursor.next += 1;
        Some((kind, sample))
    }
}

// ========================
// 转换器
// ========================

/// 转换统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemuxStats {
    /// 写出的视频采样数
    pub video_samples: u32,
    /// 写出的音频采样数
    pub audio_samples: u32,
    /// 写出的 TS 包数 (含 PAT/PMT)
    pub packets: usize,
}

impl RemuxStats {
    /// 输出字节数
    pub fn bytes(&self) -> u64 {
        (self.packets * TS_PACKET_SIZE) as u64
    }
}

/// MP4 → MPEG-TS 转换器
pub struct Mp4ToTs<'a> {
    layout: StreamLayout,
    video: Option<ElementaryStream<'a>>,
    audio: Option<ElementaryStream<'a>>,
}

impl<'a> Mp4ToTs<'a> {
    /// 从已解析的影片创建转换器
    ///
    /// 没有任何视频或音频轨道时返回 [`Mp4TsError::MissingRequiredBox`].
    pub fn new(movie: &'a MovieBox) -> Mp4TsResult<Self> {
        let video_track = movie.first_video_track();
        let audio_track = movie.first_audio_track();
        let layout = StreamLayout::from_tracks(video_track.is_some(), audio_track.is_some())
            .ok_or_else(|| Mp4TsError::MissingRequiredBox("可用的视频或音频轨道".into()))?;
        let audio_pid = match layout {
            StreamLayout::VideoAudio => PID_AUDIO,
            _ => PID_VIDEO,
        };

        let video = video_track
            .map(|t| ElementaryStream::new(TrackKind::Video, t, PID_VIDEO))
            .transpose()?;
        let audio = audio_track
            .map(|t| ElementaryStream::new(TrackKind::Audio, t, audio_pid))
            .transpose()?;

        Ok(Self {
            layout,
            video,
            audio,
        })
    }

    /// 基本流组合
    pub fn layout(&self) -> StreamLayout {
        self.layout
    }

    /// 获取指定种类的基本流
    pub fn stream(&self, kind: TrackKind) -> Option<&ElementaryStream<'a>> {
        match kind {
            TrackKind::Video => self.video.as_ref(),
            TrackKind::Audio => self.audio.as_ref(),
        }
    }

    /// 采样输出顺序
    pub fn schedule(&self) -> Schedule<'_> {
        Schedule::new(
            self.video.as_ref().map(ElementaryStream::timeline),
            self.audio.as_ref().map(ElementaryStream::timeline),
        )
    }

    /// 执行转换
    ///
    /// `input` 必须是解析出本影片的同一输入, 采样数据按需逐个读取.
    pub fn convert(&self, input: &mut IoContext, output: &mut IoContext) -> Mp4TsResult<RemuxStats> {
        output.write_all(&PAT_PACKET)?;
        output.write_all(pmt_packet(self.layout))?;
        let mut stats = RemuxStats {
            packets: 2,
            ..RemuxStats::default()
        };

        let mut counters = ContinuityCounters::new();
        for (kind, sample) in self.schedule() {
            let Some(stream) = self.stream(kind) else {
                continue;
            };
            let au = stream.access_unit(input, sample)?;
            stats.packets += write_access_unit(output, &mut counters, au)?;
            match kind {
                TrackKind::Video => stats.video_samples += 1,
                TrackKind::Audio => stats.audio_samples += 1,
            }
        }
        output.flush()?;

        log::info!(
            "转换完成: 视频 {} 个采样, 音频 {} 个采样, {} 个 TS 包 ({} 字节)",
            stats.video_samples,
            stats.audio_samples,
            stats.packets,
            stats.bytes()
        );
        Ok(stats)
    }
}

/// 解析输入并转换为 MPEG-TS
pub fn remux(input: &mut IoContext, output: &mut IoContext) -> Mp4TsResult<RemuxStats> {
    let file = Mp4File::parse(input)?;
    Mp4ToTs::new(&file.moov)?.convert(input, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::timing::SampleTime;

    fn timeline(dts: &[u64]) -> Timeline {
        Timeline::from(
            dts.iter()
                .map(|&d| SampleTime { dts: d, pts: d })
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn test_交织顺序_相同时间视频优先() {
        let video = timeline(&[0, 1500, 3000]);
        let audio = timeline(&[0, 1024, 2048]);
        let order: Vec<_> = Schedule::new(Some(&video), Some(&audio)).collect();
        assert_eq!(
            order,
            vec![
                (TrackKind::Video, 0),
                (TrackKind::Audio, 0),
                (TrackKind::Audio, 1),
                (TrackKind::Video, 1),
                (TrackKind::Audio, 2),
                (TrackKind::Video, 2),
            ]
        );
    }

    #[test]
    fn test_一条轨道耗尽后输出另一条() {
        let video = timeline(&[0]);
        let audio = timeline(&[100, 200, 300]);
        let order: Vec<_> = Schedule::new(Some(&video), Some(&audio)).collect();
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], (TrackKind::Video, 0));
        assert!(order[1..].iter().all(|(k, _)| *k == TrackKind::Audio));

        let video = timeline(&[500, 600]);
        let audio = timeline(&[0]);
        let order: Vec<_> = Schedule::new(Some(&video), Some(&audio)).collect();
        assert_eq!(
            order,
            vec![
                (TrackKind::Audio, 0),
                (TrackKind::Video, 0),
                (TrackKind::Video, 1),
            ]
        );
    }

    #[test]
    fn test_单轨道按索引顺序() {
        let audio = timeline(&[0, 1024, 2048, 3072]);
        let order: Vec<_> = Schedule::new(None, Some(&audio)).collect();
        assert_eq!(
            order,
            (0..4).map(|i| (TrackKind::Audio, i)).collect::<Vec<_>>()
        );
        assert_eq!(Schedule::new(None, None).count(), 0);
    }

    #[test]
    fn test_统计字节数() {
        let stats = RemuxStats {
            video_samples: 1,
            audio_samples: 1,
            packets: 5,
        };
        assert_eq!(stats.bytes(), 940);
    }
}
