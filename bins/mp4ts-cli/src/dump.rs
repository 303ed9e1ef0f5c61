//! 解析结果的元数据输出 (`--dump`).
//!
//! 先收集为可序列化的结构体, 再按文本或 JSON 输出.

use serde::Serialize;
use std::fmt;

use mp4ts_format::mp4::boxes::{BoxArena, fourcc_to_string};
use mp4ts_format::mp4::movie::{MovieHeaderBox, TrackBox};
use mp4ts_format::mp4::sample_description::{
    AudioSampleEntry, QuickTimeSoundExtension, SampleEntry, VisualSampleEntry,
};
use mp4ts_format::mp4::sample_table::SampleTableBox;
use mp4ts_format::Mp4File;

// ============================================================
// 输出结构体
// ============================================================

/// 完整元数据
#[derive(Debug, Serialize)]
pub struct MetadataDump {
    file_type: FileTypeInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    movie: Option<MovieInfo>,
    tracks: Vec<TrackInfo>,
    boxes: Vec<BoxInfo>,
}

/// ftyp
#[derive(Debug, Serialize)]
struct FileTypeInfo {
    major_brand: String,
    minor_version: u32,
    compatible_brands: Vec<String>,
}

/// mvhd
#[derive(Debug, Serialize)]
struct MovieInfo {
    timescale: u32,
    duration: u64,
    next_track_id: u32,
}

/// 单个轨道
#[derive(Debug, Serialize)]
struct TrackInfo {
    track_id: u32,
    handler: String,
    duration: u64,
    width: f64,
    height: f64,
    timescale: u32,
    media_duration: u64,
    language: String,
    sample_entry: SampleEntryInfo,
    tables: TableInfo,
}

/// 采样条目
#[derive(Debug, Serialize)]
struct SampleEntryInfo {
    codec: String,
    data_reference_index: u16,
    // 视频字段
    #[serde(skip_serializing_if = "Option::is_none")]
    width: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    compressor_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    depth: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    avc: Option<AvcInfo>,
    // 音频字段
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel_count: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sample_size: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    quicktime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    aac: Option<AacInfo>,
}

/// avcC
#[derive(Debug, Serialize)]
struct AvcInfo {
    profile: u8,
    compatibility: u8,
    level: u8,
    nal_length_size: u8,
    sps_sizes: Vec<usize>,
    pps_sizes: Vec<usize>,
}

/// esds / AudioSpecificConfig
#[derive(Debug, Serialize)]
struct AacInfo {
    object_type_indication: u8,
    avg_bitrate: u32,
    max_bitrate: u32,
    object_type: u8,
    sample_rate_index: u8,
    sample_rate: u32,
    channel_config: u8,
}

/// 采样表规模
#[derive(Debug, Serialize)]
struct TableInfo {
    sample_count: u32,
    chunk_count: usize,
    stts_runs: usize,
    stsc_runs: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    ctts_runs: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sync_samples: Option<usize>,
}

/// Box 树节点
#[derive(Debug, Serialize)]
struct BoxInfo {
    path: String,
    depth: usize,
    offset: u64,
    size: u64,
}

// ============================================================
// 收集
// ============================================================

impl MetadataDump {
    /// 从解析结果收集元数据
    pub fn collect(file: &Mp4File) -> Self {
        Self {
            file_type: FileTypeInfo {
                major_brand: fourcc_to_string(&file.ftyp.major_brand),
                minor_version: file.ftyp.minor_version,
                compatible_brands: file
                    .ftyp
                    .compatible_brands
                    .iter()
                    .map(fourcc_to_string)
                    .collect(),
            },
            movie: file.moov.mvhd.as_ref().map(movie_info),
            tracks: file.moov.tracks.iter().map(track_info).collect(),
            boxes: box_tree(&file.arena),
        }
    }

    /// JSON 文本
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn movie_info(mvhd: &MovieHeaderBox) -> MovieInfo {
    MovieInfo {
        timescale: mvhd.timescale,
        duration: mvhd.duration,
        next_track_id: mvhd.next_track_id,
    }
}

fn track_info(track: &TrackBox) -> TrackInfo {
    let mdhd = &track.mdia.mdhd;
    TrackInfo {
        track_id: track.tkhd.track_id,
        handler: track.handler().to_string(),
        duration: track.tkhd.duration,
        width: fixed_16_16(track.tkhd.width),
        height: fixed_16_16(track.tkhd.height),
        timescale: mdhd.timescale,
        media_duration: mdhd.duration,
        language: mdhd.language.clone(),
        sample_entry: sample_entry_info(&track.sample_table().sample_entry),
        tables: table_info(track.sample_table()),
    }
}

fn sample_entry_info(entry: &SampleEntry) -> SampleEntryInfo {
    let mut info = SampleEntryInfo {
        codec: entry.coding_name().to_string(),
        data_reference_index: entry.data_reference_index(),
        width: None,
        height: None,
        compressor_name: None,
        depth: None,
        avc: None,
        version: None,
        channel_count: None,
        sample_size: None,
        sample_rate: None,
        quicktime: None,
        aac: None,
    };

    match entry {
        SampleEntry::Video(VisualSampleEntry {
            width,
            height,
            compressor_name,
            depth,
            avc,
            ..
        }) => {
            info.width = Some(*width);
            info.height = Some(*height);
            info.compressor_name = Some(compressor_name.clone());
            info.depth = Some(*depth);
            info.avc = Some(AvcInfo {
                profile: avc.profile_indication,
                compatibility: avc.profile_compatibility,
                level: avc.level_indication,
                nal_length_size: avc.nal_length_size,
                sps_sizes: avc.sps.iter().map(Vec::len).collect(),
                pps_sizes: avc.pps.iter().map(Vec::len).collect(),
            });
        }
        SampleEntry::Audio(AudioSampleEntry {
            version,
            channel_count,
            sample_size,
            sample_rate,
            quicktime,
            aac,
            ..
        }) => {
            info.version = Some(*version);
            info.channel_count = Some(*channel_count);
            info.sample_size = Some(*sample_size);
            info.sample_rate = Some(*sample_rate);
            info.quicktime = quicktime.as_ref().map(quicktime_summary);
            info.aac = Some(AacInfo {
                object_type_indication: aac.object_type_indication,
                avg_bitrate: aac.avg_bitrate,
                max_bitrate: aac.max_bitrate,
                object_type: aac.object_type,
                sample_rate_index: aac.sample_rate_index,
                sample_rate: aac.sample_rate,
                channel_config: aac.channel_config,
            });
        }
    }

    info
}

fn quicktime_summary(ext: &QuickTimeSoundExtension) -> String {
    match ext {
        QuickTimeSoundExtension::V1 {
            samples_per_packet,
            bytes_per_packet,
            bytes_per_frame,
            bytes_per_sample,
        } => format!(
            "v1 samples/packet={samples_per_packet} bytes/packet={bytes_per_packet} \
             bytes/frame={bytes_per_frame} bytes/sample={bytes_per_sample}"
        ),
        QuickTimeSoundExtension::V2 {
            sample_rate,
            channel_count,
            bits_per_channel,
            frames_per_packet,
            ..
        } => format!(
            "v2 rate={sample_rate} channels={channel_count} bits={bits_per_channel} \
             frames/packet={frames_per_packet}"
        ),
    }
}

fn table_info(stbl: &SampleTableBox) -> TableInfo {
    TableInfo {
        sample_count: stbl.sample_count(),
        chunk_count: stbl.chunk_count(),
        stts_runs: stbl.time_to_sample.len(),
        stsc_runs: stbl.sample_to_chunk.len(),
        ctts_runs: stbl.composition_offsets.as_ref().map(Vec::len),
        sync_samples: stbl.sync_samples.as_ref().map(Vec::len),
    }
}

/// 按文件偏移排列, 即树的先序
fn box_tree(arena: &BoxArena) -> Vec<BoxInfo> {
    let mut boxes: Vec<BoxInfo> = (0..arena.len())
        .filter_map(|id| {
            arena.get(id).map(|node| BoxInfo {
                path: arena.path(id),
                depth: arena.depth(id),
                offset: node.offset,
                size: node.size,
            })
        })
        .collect();
    boxes.sort_by_key(|b| b.offset);
    boxes
}

/// 16.16 定点数转浮点
fn fixed_16_16(value: u32) -> f64 {
    f64::from(value) / 65536.0
}

// ============================================================
// 文本输出
// ============================================================

impl fmt::Display for MetadataDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ft = &self.file_type;
        writeln!(f, "[FTYP]")?;
        writeln!(f, "  主品牌       : {}", ft.major_brand)?;
        writeln!(f, "  次版本       : {}", ft.minor_version)?;
        writeln!(f, "  兼容品牌     : {}", ft.compatible_brands.join(", "))?;
        writeln!(f, "[/FTYP]")?;

        if let Some(ref movie) = self.movie {
            writeln!(f, "[MVHD]")?;
            writeln!(f, "  时间刻度     : {}", movie.timescale)?;
            writeln!(f, "  时长         : {}", movie.duration)?;
            writeln!(f, "  下一轨道 ID  : {}", movie.next_track_id)?;
            writeln!(f, "[/MVHD]")?;
        }

        for track in &self.tracks {
            writeln!(f, "[TRACK #{}]", track.track_id)?;
            writeln!(f, "  处理器       : {}", track.handler)?;
            writeln!(f, "  时长         : {}", track.duration)?;
            writeln!(f, "  尺寸         : {}x{}", track.width, track.height)?;
            writeln!(f, "  时间刻度     : {}", track.timescale)?;
            writeln!(f, "  媒体时长     : {}", track.media_duration)?;
            writeln!(f, "  语言         : {}", track.language)?;
            write_sample_entry(f, &track.sample_entry)?;

            let t = &track.tables;
            writeln!(f, "  采样数       : {}", t.sample_count)?;
            writeln!(f, "  块数         : {}", t.chunk_count)?;
            writeln!(f, "  stts 条目    : {}", t.stts_runs)?;
            writeln!(f, "  stsc 条目    : {}", t.stsc_runs)?;
            if let Some(n) = t.ctts_runs {
                writeln!(f, "  ctts 条目    : {n}")?;
            }
            if let Some(n) = t.sync_samples {
                writeln!(f, "  同步采样     : {n}")?;
            }
            writeln!(f, "[/TRACK]")?;
        }

        writeln!(f, "[BOXES]")?;
        for node in &self.boxes {
            let name = node.path.rsplit('/').next().unwrap_or(&node.path);
            writeln!(
                f,
                "  {:indent$}{} (offset {}, size {})",
                "",
                name,
                node.offset,
                node.size,
                indent = node.depth * 2
            )?;
        }
        writeln!(f, "[/BOXES]")
    }
}

fn write_sample_entry(f: &mut fmt::Formatter<'_>, e: &SampleEntryInfo) -> fmt::Result {
    writeln!(f, "  编码         : {}", e.codec)?;
    writeln!(f, "  数据引用     : {}", e.data_reference_index)?;

    // 视频特有
    if let (Some(w), Some(h)) = (e.width, e.height) {
        writeln!(f, "  分辨率       : {w}x{h}")?;
    }
    if let Some(ref name) = e.compressor_name {
        writeln!(f, "  压缩器       : {name}")?;
    }
    if let Some(depth) = e.depth {
        writeln!(f, "  色深         : {depth}")?;
    }
    if let Some(ref avc) = e.avc {
        writeln!(
            f,
            "  avcC         : profile={} compat={} level={} nal_length={} sps={:?} pps={:?}",
            avc.profile,
            avc.compatibility,
            avc.level,
            avc.nal_length_size,
            avc.sps_sizes,
            avc.pps_sizes
        )?;
    }

    // 音频特有
    if let Some(version) = e.version {
        writeln!(f, "  条目版本     : {version}")?;
    }
    if let Some(ch) = e.channel_count {
        writeln!(f, "  声道数       : {ch}")?;
    }
    if let Some(bits) = e.sample_size {
        writeln!(f, "  采样位数     : {bits}")?;
    }
    if let Some(rate) = e.sample_rate {
        writeln!(f, "  采样率       : {rate} Hz")?;
    }
    if let Some(ref qt) = e.quicktime {
        writeln!(f, "  QuickTime    : {qt}")?;
    }
    if let Some(ref aac) = e.aac {
        writeln!(
            f,
            "  esds         : oti=0x{:02X} object_type={} sri={} ({} Hz) channel_config={} avg={} max={}",
            aac.object_type_indication,
            aac.object_type,
            aac.sample_rate_index,
            aac.sample_rate,
            aac.channel_config,
            aac.avg_bitrate,
            aac.max_bitrate
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_定点数转换() {
        assert_eq!(fixed_16_16(0), 0.0);
        assert_eq!(fixed_16_16(1920 << 16), 1920.0);
        assert_eq!(fixed_16_16(0x0000_8000), 0.5);
    }

    #[test]
    fn test_quicktime_扩展摘要() {
        let v1 = QuickTimeSoundExtension::V1 {
            samples_per_packet: 1024,
            bytes_per_packet: 0,
            bytes_per_frame: 0,
            bytes_per_sample: 2,
        };
        assert!(quicktime_summary(&v1).starts_with("v1 samples/packet=1024"));

        let v2 = QuickTimeSoundExtension::V2 {
            struct_size: 72,
            sample_rate: 48000.0,
            channel_count: 2,
            bits_per_channel: 16,
            format_flags: 0,
            bytes_per_packet: 0,
            frames_per_packet: 1024,
        };
        let text = quicktime_summary(&v2);
        assert!(text.contains("rate=48000"));
        assert!(text.contains("frames/packet=1024"));
    }
}
