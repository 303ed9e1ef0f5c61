//! MP4 采样表 (Sample Table) 解析.
//!
//! 采样表 (stbl) 由多个子 box 共同组成:
//! - stsd: 采样描述 (编解码器参数)
//! - stts: 解码时间增量 (Run-Length 编码)
//! - ctts: 合成时间偏移 (仅视频, 可选)
//! - stss: 同步采样 (关键帧) 列表 (视频必需, 音频禁止)
//! - stsc: 采样→块映射 (Run-Length 编码)
//! - stsz: 每个采样的字节大小
//! - stco/co64: 每个块的文件偏移
//!
//! 子 box 读完后按轨道类型校验必需集合.

use mp4ts_core::{Mp4TsError, Mp4TsResult};

use super::boxes::{BoxReader, BoxType};
use super::movie::{HandlerType, ParseContext};
use super::sample_description::SampleEntry;

/// 时间→采样条目 (stts)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeToSampleEntry {
    /// 采样计数
    pub count: u32,
    /// 每采样的时间增量
    pub delta: u32,
}

/// 合成时间偏移条目 (ctts, 仅支持版本 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositionOffsetEntry {
    /// 采样计数
    pub count: u32,
    /// 偏移量 (无符号)
    pub offset: u32,
}

/// 采样→块条目 (stsc)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleToChunkEntry {
    /// 起始块号 (1-based)
    pub first_chunk: u32,
    /// 每块的采样数
    pub samples_per_chunk: u32,
    /// 采样描述索引
    pub sample_description_index: u32,
}

/// 采样大小表 (stsz)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleSizes {
    /// 所有采样大小相同
    Constant {
        /// 采样大小
        size: u32,
        /// 采样数
        count: u32,
    },
    /// 逐采样大小
    PerSample(Vec<u32>),
}

impl SampleSizes {
    /// 采样数
    pub fn count(&self) -> u32 {
        match self {
            Self::Constant { count, .. } => *count,
            Self::PerSample(sizes) => sizes.len() as u32,
        }
    }

    /// 获取指定采样 (0-based) 的大小
    pub fn get(&self, index: u32) -> Option<u32> {
        match self {
            Self::Constant { size, count } => (index < *count).then_some(*size),
            Self::PerSample(sizes) => sizes.get(index as usize).copied(),
        }
    }
}

/// 块偏移表 (stco 或 co64)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOffsets {
    /// 32 位偏移
    Stco(Vec<u32>),
    /// 64 位偏移
    Co64(Vec<u64>),
}

impl ChunkOffsets {
    /// 块数
    pub fn len(&self) -> usize {
        match self {
            Self::Stco(v) => v.len(),
            Self::Co64(v) => v.len(),
        }
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 获取指定块 (0-based) 的文件偏移
    pub fn get(&self, index: usize) -> Option<u64> {
        match self {
            Self::Stco(v) => v.get(index).map(|&o| u64::from(o)),
            Self::Co64(v) => v.get(index).copied(),
        }
    }
}

/// 已校验的采样表
#[derive(Debug, Clone, PartialEq)]
pub struct SampleTableBox {
    /// 唯一的采样条目
    pub sample_entry: SampleEntry,
    /// stts
    pub time_to_sample: Vec<TimeToSampleEntry>,
    /// ctts
    pub composition_offsets: Option<Vec<CompositionOffsetEntry>>,
    /// stss (1-based 采样编号, 升序)
    pub sync_samples: Option<Vec<u32>>,
    /// stsc
    pub sample_to_chunk: Vec<SampleToChunkEntry>,
    /// stsz
    pub sample_sizes: SampleSizes,
    /// stco/co64
    pub chunk_offsets: ChunkOffsets,
}

impl SampleTableBox {
    /// 解析 stbl box 并校验必需的子 box
    pub fn parse(b: &mut BoxReader<'_>, ctx: ParseContext) -> Mp4TsResult<Self> {
        let mut builder = SampleTableBuilder::default();
        b.for_each_child(|child| {
            match child.box_type() {
                BoxType::Stsd => {
                    builder.sample_entry = Some(SampleEntry::parse_stsd(child, ctx)?);
                }
                BoxType::Stts => builder.time_to_sample = Some(parse_stts(child)?),
                BoxType::Ctts => builder.composition_offsets = Some(parse_ctts(child)?),
                BoxType::Stss => builder.sync_samples = Some(parse_stss(child)?),
                BoxType::Stsc => builder.sample_to_chunk = Some(parse_stsc(child)?),
                BoxType::Stsz => builder.sample_sizes = Some(parse_stsz(child)?),
                BoxType::Stco => builder.chunk_offsets = Some(parse_stco(child)?),
                BoxType::Co64 => builder.chunk_offsets = Some(parse_co64(child)?),
                other => log::debug!("{}: 跳过 {}", child.path(), other),
            }
            Ok(())
        })?;
        builder.build(ctx.handler, &b.path())
    }

    /// 总采样数 (以 stsz 为准)
    pub fn sample_count(&self) -> u32 {
        self.sample_sizes.count()
    }

    /// 块数
    pub fn chunk_count(&self) -> usize {
        self.chunk_offsets.len()
    }

    /// 获取指定采样 (0-based) 的大小
    pub fn sample_size(&self, index: u32) -> Option<u32> {
        self.sample_sizes.get(index)
    }

    /// 判断指定采样 (0-based) 是否为同步采样
    ///
    /// 没有 stss 时所有采样都是同步采样.
    pub fn is_sync_sample(&self, index: u32) -> bool {
        match &self.sync_samples {
            Some(list) => list.binary_search(&(index + 1)).is_ok(),
            None => true,
        }
    }

    /// 校验 stsc × 块数推出的采样数与 stsz 一致
    pub fn validate_sample_counts(&self) -> Mp4TsResult<()> {
        let chunk_count = self.chunk_count() as u64;
        let mut implied = 0u64;
        for (i, run) in self.sample_to_chunk.iter().enumerate() {
            let first = u64::from(run.first_chunk);
            let end = self
                .sample_to_chunk
                .get(i + 1)
                .map_or(chunk_count + 1, |next| u64::from(next.first_chunk));
            if first > chunk_count || end > chunk_count + 1 {
                return Err(Mp4TsError::Malformed(format!(
                    "stsc 第 {} 项起始块 {} 超出块偏移表长度 {}",
                    i, first, chunk_count
                )));
            }
            implied += (end - first) * u64::from(run.samples_per_chunk);
        }

        let declared = u64::from(self.sample_count());
        if implied != declared {
            return Err(Mp4TsError::Malformed(format!(
                "采样数不一致: stsz 声明 {}, stsc/stco 推出 {}",
                declared, implied
            )));
        }
        Ok(())
    }
}

/// 采样表构建器
///
/// 收集 stbl 的各个子 box, 全部读完后由 [`SampleTableBuilder::build`] 按轨道类型校验.
#[derive(Debug, Default)]
pub struct SampleTableBuilder {
    /// stsd
    pub sample_entry: Option<SampleEntry>,
    /// stts
    pub time_to_sample: Option<Vec<TimeToSampleEntry>>,
    /// ctts
    pub composition_offsets: Option<Vec<CompositionOffsetEntry>>,
    /// stss
    pub sync_samples: Option<Vec<u32>>,
    /// stsc
    pub sample_to_chunk: Option<Vec<SampleToChunkEntry>>,
    /// stsz
    pub sample_sizes: Option<SampleSizes>,
    /// stco/co64
    pub chunk_offsets: Option<ChunkOffsets>,
}

impl SampleTableBuilder {
    /// 按轨道类型校验必需集合并生成采样表
    ///
    /// - 视频: stsd, stts, stss, stsc, stsz, stco/co64
    /// - 音频: 同上但不含 stss, 且不得出现 stss 或 ctts
    pub fn build(self, handler: HandlerType, path: &str) -> Mp4TsResult<SampleTableBox> {
        let missing = |name: &str| Mp4TsError::MissingRequiredBox(format!("{}/{}", path, name));

        match handler {
            HandlerType::Video => {}
            HandlerType::Audio => {
                if self.sync_samples.is_some() {
                    return Err(Mp4TsError::Malformed(format!("{}: 音频轨道不允许 stss", path)));
                }
                if self.composition_offsets.is_some() {
                    return Err(Mp4TsError::Malformed(format!("{}: 音频轨道不允许 ctts", path)));
                }
            }
            HandlerType::Other(_) => {
                return Err(Mp4TsError::UnsupportedCodec(format!(
                    "{}: 处理器类型 {} 没有采样表",
                    path, handler
                )));
            }
        }

        let sample_entry = self.sample_entry.ok_or_else(|| missing("stsd"))?;
        let time_to_sample = self.time_to_sample.ok_or_else(|| missing("stts"))?;
        let sync_samples = match handler {
            HandlerType::Video => Some(self.sync_samples.ok_or_else(|| missing("stss"))?),
            _ => None,
        };
        let sample_to_chunk = self.sample_to_chunk.ok_or_else(|| missing("stsc"))?;
        let sample_sizes = self.sample_sizes.ok_or_else(|| missing("stsz"))?;
        let chunk_offsets = self.chunk_offsets.ok_or_else(|| missing("stco"))?;

        log::debug!(
            "{}: {} 个采样, {} 个块, stts {} 项",
            path,
            sample_sizes.count(),
            chunk_offsets.len(),
            time_to_sample.len()
        );

        Ok(SampleTableBox {
            sample_entry,
            time_to_sample,
            composition_offsets: self.composition_offsets,
            sync_samples,
            sample_to_chunk,
            sample_sizes,
            chunk_offsets,
        })
    }
}

// ========================
// 各子 box 的解析
// ========================

/// 读取条目数, 并确认 `count × entry_size` 字节都在 box 内
fn read_entry_count(b: &mut BoxReader<'_>, entry_size: u64) -> Mp4TsResult<u32> {
    let count = b.read_u32()?;
    let needed = u64::from(count) * entry_size;
    if needed > b.remaining() {
        return Err(Mp4TsError::Malformed(format!(
            "{}: {} 个条目需要 {} 字节, 剩余 {}",
            b.path(),
            count,
            needed,
            b.remaining()
        )));
    }
    Ok(count)
}

fn parse_stts(b: &mut BoxReader<'_>) -> Mp4TsResult<Vec<TimeToSampleEntry>> {
    b.read_full_box_header()?;
    let count = read_entry_count(b, 8)?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        entries.push(TimeToSampleEntry {
            count: b.read_u32()?,
            delta: b.read_u32()?,
        });
    }
    Ok(entries)
}

fn parse_ctts(b: &mut BoxReader<'_>) -> Mp4TsResult<Vec<CompositionOffsetEntry>> {
    let header = b.read_full_box_header()?;
    if header.version != 0 {
        return Err(Mp4TsError::UnsupportedCodec(format!(
            "ctts 版本 {} 不受支持, 仅支持版本 0",
            header.version
        )));
    }
    let count = read_entry_count(b, 8)?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        entries.push(CompositionOffsetEntry {
            count: b.read_u32()?,
            offset: b.read_u32()?,
        });
    }
    Ok(entries)
}

fn parse_stss(b: &mut BoxReader<'_>) -> Mp4TsResult<Vec<u32>> {
    b.read_full_box_header()?;
    let count = read_entry_count(b, 4)?;
    b.read_u32_array(count)
}

fn parse_stsc(b: &mut BoxReader<'_>) -> Mp4TsResult<Vec<SampleToChunkEntry>> {
    b.read_full_box_header()?;
    let count = read_entry_count(b, 12)?;
    let mut entries: Vec<SampleToChunkEntry> = Vec::with_capacity(count as usize);
    for i in 0..count {
        let entry = SampleToChunkEntry {
            first_chunk: b.read_u32()?,
            samples_per_chunk: b.read_u32()?,
            sample_description_index: b.read_u32()?,
        };
        let prev = entries.last().map_or(0, |e| e.first_chunk);
        if entry.first_chunk <= prev {
            return Err(Mp4TsError::Malformed(format!(
                "stsc 第 {} 项起始块 {} 未递增",
                i, entry.first_chunk
            )));
        }
        entries.push(entry);
    }
    Ok(entries)
}

fn parse_stsz(b: &mut BoxReader<'_>) -> Mp4TsResult<SampleSizes> {
    b.read_full_box_header()?;
    let size = b.read_u32()?;
    if size != 0 {
        let count = b.read_u32()?;
        return Ok(SampleSizes::Constant { size, count });
    }
    let count = read_entry_count(b, 4)?;
    Ok(SampleSizes::PerSample(b.read_u32_array(count)?))
}

fn parse_stco(b: &mut BoxReader<'_>) -> Mp4TsResult<ChunkOffsets> {
    b.read_full_box_header()?;
    let count = read_entry_count(b, 4)?;
    Ok(ChunkOffsets::Stco(b.read_u32_array(count)?))
}

fn parse_co64(b: &mut BoxReader<'_>) -> Mp4TsResult<ChunkOffsets> {
    b.read_full_box_header()?;
    let count = read_entry_count(b, 8)?;
    let mut offsets = Vec::with_capacity(count as usize);
    for _ in 0..count {
        offsets.push(b.read_u64()?);
    }
    Ok(ChunkOffsets::Co64(offsets))
}
