//! 采样定位: 采样索引 → (文件偏移, 字节大小).
//!
//! [`locate_sample`] 每次从第一个采样开始重放 stsc, 是定位规则的直接表达.
//! [`SampleIndex`] 一次遍历预先算出所有采样的位置, 结果与重放一致,
//! 转换时使用后者.

use mp4ts_core::{Mp4TsError, Mp4TsResult};

use super::sample_table::SampleTableBox;

/// 采样在文件中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleLocation {
    /// 绝对文件偏移
    pub offset: u64,
    /// 字节大小
    pub size: u32,
}

/// 重放 stsc 定位单个采样 (0-based)
pub fn locate_sample(table: &SampleTableBox, index: u32) -> Mp4TsResult<SampleLocation> {
    let sample_count = table.sample_count();
    if index >= sample_count {
        return Err(Mp4TsError::Malformed(format!(
            "采样索引 {} 超出采样数 {}",
            index, sample_count
        )));
    }
    let runs = &table.sample_to_chunk;
    if runs.is_empty() {
        return Err(Mp4TsError::Malformed("stsc 为空".into()));
    }
    let chunk_count = table.chunk_count() as u64;

    let mut chunk_id = 1u64;
    let mut chunk_samples = 0u32;
    let mut run_index = 0usize;
    let mut offset_in_chunk = 0u64;
    let mut size = 0u32;

    for sample_id in 0..=index {
        size = table
            .sample_size(sample_id)
            .ok_or_else(|| Mp4TsError::Malformed(format!("stsz 缺少采样 {}", sample_id)))?;

        chunk_samples += 1;
        if chunk_samples > runs[run_index].samples_per_chunk {
            chunk_id += 1;
            chunk_samples = 1;
            offset_in_chunk = 0;
        }
        if chunk_id > chunk_count {
            return Err(Mp4TsError::Malformed(format!(
                "采样 {} 的块号 {} 超出块偏移表长度 {}",
                sample_id, chunk_id, chunk_count
            )));
        }
        // 进入下一段的起始块
        if runs
            .get(run_index + 1)
            .is_some_and(|next| u64::from(next.first_chunk) == chunk_id)
        {
            chunk_samples = 1;
            run_index += 1;
            offset_in_chunk = 0;
        }

        if sample_id != index {
            offset_in_chunk += u64::from(size);
        }
    }

    let base = table
        .chunk_offsets
        .get((chunk_id - 1) as usize)
        .ok_or_else(|| Mp4TsError::Malformed(format!("块 {} 没有偏移", chunk_id)))?;
    Ok(SampleLocation {
        offset: base + offset_in_chunk,
        size,
    })
}

/// 预计算的采样位置索引
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleIndex {
    locations: Vec<SampleLocation>,
}

impl SampleIndex {
    /// 一次遍历 stsc/stco/stsz 构建索引
    ///
    /// 先校验三张表的采样数一致.
    pub fn build(table: &SampleTableBox) -> Mp4TsResult<Self> {
        table.validate_sample_counts()?;

        let runs = &table.sample_to_chunk;
        let chunk_count = table.chunk_count() as u32;
        let mut locations = Vec::with_capacity(table.sample_count() as usize);
        let mut sample = 0u32;

        for (i, run) in runs.iter().enumerate() {
            let end = runs.get(i + 1).map_or(chunk_count + 1, |next| next.first_chunk);
            for chunk_id in run.first_chunk..end {
                let mut offset = table
                    .chunk_offsets
                    .get((chunk_id - 1) as usize)
                    .ok_or_else(|| Mp4TsError::Malformed(format!("块 {} 没有偏移", chunk_id)))?;
                for _ in 0..run.samples_per_chunk {
                    let size = table
                        .sample_size(sample)
                        .ok_or_else(|| Mp4TsError::Malformed(format!("stsz 缺少采样 {}", sample)))?;
                    locations.push(SampleLocation { offset, size });
                    offset += u64::from(size);
                    sample += 1;
                }
            }
        }

        Ok(Self { locations })
    }

    /// 采样数
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// 获取指定采样的位置
    pub fn get(&self, index: u32) -> Option<SampleLocation> {
        self.locations.get(index as usize).copied()
    }

    /// 遍历全部位置
    pub fn iter(&self) -> impl Iterator<Item = &SampleLocation> {
        self.locations.iter()
    }
}
