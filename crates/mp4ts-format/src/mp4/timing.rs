//! 时间戳计算: 采样索引 → (DTS, PTS), 统一换算到 90 kHz.

use mp4ts_core::{Mp4TsError, Mp4TsResult};

use super::sample_table::SampleTableBox;

/// MPEG-TS 时钟频率
pub const TS_CLOCK_HZ: u64 = 90_000;

/// 把媒体时间刻度下的时间换算到 90 kHz (四舍五入)
///
/// `timescale` 必须非零, mdhd 解析时已保证.
pub fn rescale_90k(t: u64, timescale: u32) -> u64 {
    let ts = u128::from(timescale);
    ((u128::from(t) * u128::from(TS_CLOCK_HZ) + ts / 2) / ts) as u64
}

/// 采样的解码时间 (媒体时间刻度)
///
/// 累加目标之前所有采样的 stts 增量.
pub fn decode_time(table: &SampleTableBox, index: u32) -> Mp4TsResult<u64> {
    let mut dts = 0u64;
    let mut left = u64::from(index);
    for run in &table.time_to_sample {
        let count = u64::from(run.count);
        if left < count {
            return Ok(dts + left * u64::from(run.delta));
        }
        dts += count * u64::from(run.delta);
        left -= count;
    }
    Err(Mp4TsError::Malformed(format!("stts 未覆盖采样 {}", index)))
}

/// 采样自身的合成时间偏移 (没有 ctts 时为 0)
pub fn composition_offset(table: &SampleTableBox, index: u32) -> Mp4TsResult<u64> {
    let Some(runs) = &table.composition_offsets else {
        return Ok(0);
    };
    let mut left = index;
    for run in runs {
        if left < run.count {
            return Ok(u64::from(run.offset));
        }
        left -= run.count;
    }
    Err(Mp4TsError::Malformed(format!("ctts 未覆盖采样 {}", index)))
}

fn check_timescale(timescale: u32) -> Mp4TsResult<()> {
    if timescale == 0 {
        return Err(Mp4TsError::Malformed("媒体 timescale 为 0".into()));
    }
    Ok(())
}

/// 90 kHz 下的解码/显示时间戳
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleTime {
    /// 解码时间戳
    pub dts: u64,
    /// 显示时间戳
    pub pts: u64,
}

/// 计算单个采样的 90 kHz 时间戳
pub fn sample_timestamps(
    table: &SampleTableBox,
    index: u32,
    timescale: u32,
) -> Mp4TsResult<SampleTime> {
    check_timescale(timescale)?;
    let dts = decode_time(table, index)?;
    let pts = dts + composition_offset(table, index)?;
    Ok(SampleTime {
        dts: rescale_90k(dts, timescale),
        pts: rescale_90k(pts, timescale),
    })
}

/// 轨道全部采样的时间戳 (一次遍历)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeline {
    times: Vec<SampleTime>,
}

impl Timeline {
    /// 按 stsz 的采样数构建, stts/ctts 覆盖不足时报错
    pub fn build(table: &SampleTableBox, timescale: u32) -> Mp4TsResult<Self> {
        check_timescale(timescale)?;
        let count = table.sample_count();
        let mut times = Vec::with_capacity(count as usize);

        let mut deltas = table
            .time_to_sample
            .iter()
            .flat_map(|run| std::iter::repeat_n(run.delta, run.count as usize));
        let mut offsets = table.composition_offsets.as_ref().map(|runs| {
            runs.iter()
                .flat_map(|run| std::iter::repeat_n(run.offset, run.count as usize))
        });

        let mut dts = 0u64;
        for index in 0..count {
            let delta = deltas
                .next()
                .ok_or_else(|| Mp4TsError::Malformed(format!("stts 未覆盖采样 {}", index)))?;
            let offset = match offsets.as_mut() {
                Some(iter) => iter
                    .next()
                    .ok_or_else(|| Mp4TsError::Malformed(format!("ctts 未覆盖采样 {}", index)))?,
                None => 0,
            };
            times.push(SampleTime {
                dts: rescale_90k(dts, timescale),
                pts: rescale_90k(dts + u64::from(offset), timescale),
            });
            dts += u64::from(delta);
        }

        Ok(Self { times })
    }

    /// 采样数
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// 获取指定采样的时间戳
    pub fn get(&self, index: u32) -> Option<SampleTime> {
        self.times.get(index as usize).copied()
    }
}

impl From<Vec<SampleTime>> for Timeline {
    fn from(times: Vec<SampleTime>) -> Self {
        Self { times }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::codec_config::AvcDecoderConfig;
    use crate::mp4::sample_description::{SampleEntry, VisualSampleEntry};
    use crate::mp4::sample_table::{
        ChunkOffsets, CompositionOffsetEntry, SampleSizes, SampleToChunkEntry, TimeToSampleEntry,
    };

    fn video_table(
        stts: Vec<TimeToSampleEntry>,
        ctts: Option<Vec<CompositionOffsetEntry>>,
        count: u32,
    ) -> SampleTableBox {
        SampleTableBox {
            sample_entry: SampleEntry::Video(VisualSampleEntry {
                data_reference_index: 1,
                width: 16,
                height: 16,
                horiz_resolution: 0,
                vert_resolution: 0,
                frame_count: 1,
                compressor_name: String::new(),
                depth: 0x18,
                avc: AvcDecoderConfig {
                    profile_indication: 0x42,
                    profile_compatibility: 0,
                    level_indication: 0x1E,
                    nal_length_size: 4,
                    sps: vec![],
                    pps: vec![],
                },
            }),
            time_to_sample: stts,
            composition_offsets: ctts,
            sync_samples: Some(vec![1]),
            sample_to_chunk: vec![SampleToChunkEntry {
                first_chunk: 1,
                samples_per_chunk: count,
                sample_description_index: 1,
            }],
            sample_sizes: SampleSizes::Constant { size: 1, count },
            chunk_offsets: ChunkOffsets::Stco(vec![0]),
        }
    }

    #[test]
    fn test_90k换算() {
        assert_eq!(rescale_90k(0, 1000), 0);
        assert_eq!(rescale_90k(1000, 1000), 90000);
        assert_eq!(rescale_90k(33, 1000), 2970);
        assert_eq!(rescale_90k(1024, 44100), 2090);
        assert_eq!(rescale_90k(1024, 48000), 1920);
        assert_eq!(rescale_90k(441, 44100), 900);
        // 0.5 向上取整
        assert_eq!(rescale_90k(1, 180000), 1);
        assert_eq!(rescale_90k(u64::from(u32::MAX) * 4, 90000), u64::from(u32::MAX) * 4);
    }

    #[test]
    fn test_解码时间累加() {
        let stts = vec![
            TimeToSampleEntry { count: 2, delta: 100 },
            TimeToSampleEntry { count: 3, delta: 50 },
        ];
        let t = video_table(stts, None, 5);
        let dts: Vec<u64> = (0..5).map(|i| decode_time(&t, i).unwrap()).collect();
        assert_eq!(dts, vec![0, 100, 200, 250, 300]);
        assert!(matches!(decode_time(&t, 5), Err(Mp4TsError::Malformed(_))));
    }

    #[test]
    fn test_合成偏移只取目标所在段() {
        let ctts = vec![
            CompositionOffsetEntry { count: 1, offset: 200 },
            CompositionOffsetEntry { count: 2, offset: 0 },
            CompositionOffsetEntry { count: 1, offset: 100 },
        ];
        let stts = vec![TimeToSampleEntry { count: 4, delta: 100 }];
        let t = video_table(stts, Some(ctts), 4);
        assert_eq!(composition_offset(&t, 0).unwrap(), 200);
        assert_eq!(composition_offset(&t, 2).unwrap(), 0);
        assert_eq!(composition_offset(&t, 3).unwrap(), 100);

        let ts = sample_timestamps(&t, 3, 1000).unwrap();
        assert_eq!(ts, SampleTime { dts: 27000, pts: 36000 });
    }

    #[test]
    fn test_时间线与逐个计算一致() {
        let stts = vec![
            TimeToSampleEntry { count: 3, delta: 1001 },
            TimeToSampleEntry { count: 2, delta: 2002 },
        ];
        let ctts = vec![
            CompositionOffsetEntry { count: 2, offset: 2002 },
            CompositionOffsetEntry { count: 3, offset: 1001 },
        ];
        let t = video_table(stts, Some(ctts), 5);
        let timeline = Timeline::build(&t, 30000).unwrap();
        assert_eq!(timeline.len(), 5);
        for i in 0..5 {
            assert_eq!(timeline.get(i), Some(sample_timestamps(&t, i, 30000).unwrap()));
        }
        assert_eq!(timeline.get(1).unwrap().dts, 3003);
    }

    #[test]
    fn test_零时间刻度被拒绝() {
        let stts = vec![TimeToSampleEntry { count: 2, delta: 10 }];
        let t = video_table(stts, None, 2);
        assert!(matches!(Timeline::build(&t, 0), Err(Mp4TsError::Malformed(_))));
        assert!(matches!(sample_timestamps(&t, 0, 0), Err(Mp4TsError::Malformed(_))));
    }

    #[test]
    fn test_时间线stts不足() {
        let stts = vec![TimeToSampleEntry { count: 2, delta: 10 }];
        let t = video_table(stts, None, 3);
        assert!(matches!(Timeline::build(&t, 1000), Err(Mp4TsError::Malformed(_))));
    }
}
