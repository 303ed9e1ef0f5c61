//! 影片级 box 树: ftyp, moov 及其下的轨道结构.
//!
//! # Box 树结构
//! ```text
//! ftyp                  文件类型 (品牌决定 QuickTime 音频条目布局)
//! moov                  影片元数据
//! ├── mvhd              影片头部
//! └── trak              轨道
//!     ├── tkhd          轨道头部
//!     └── mdia          媒体信息
//!         ├── mdhd      媒体头部 (时间刻度, 语言)
//!         ├── hdlr      处理器引用 (vide/soun)
//!         └── minf      媒体详细信息
//!             ├── vmhd/smhd
//!             ├── dinf → dref
//!             └── stbl  采样表
//! mdat                  媒体数据 (不解析, 按偏移读取)
//! ```
//!
//! 子 box 需要的祖先信息 (处理器类型, 文件品牌) 在进入容器时收集到
//! [`ParseContext`] 中按值向下传递.

use std::fmt;

use mp4ts_core::bitreader::BitReader;
use mp4ts_core::{Mp4TsError, Mp4TsResult};

use crate::io::IoContext;

use super::boxes::{BoxArena, BoxReader, BoxType, NodeId, fourcc_to_string};
use super::sample_table::SampleTableBox;

/// QuickTime 品牌
const QUICKTIME_BRAND: [u8; 4] = *b"qt  ";

// ========================
// 解析上下文
// ========================

/// 处理器类型 (hdlr)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerType {
    /// 视频 (`vide`)
    Video,
    /// 音频 (`soun`)
    Audio,
    /// 其他 (字幕, 提示, 元数据等)
    Other([u8; 4]),
}

impl HandlerType {
    /// 从 FourCC 识别
    pub fn from_fourcc(cc: &[u8; 4]) -> Self {
        match cc {
            b"vide" => Self::Video,
            b"soun" => Self::Audio,
            _ => Self::Other(*cc),
        }
    }

    /// 转为 FourCC
    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            Self::Video => *b"vide",
            Self::Audio => *b"soun",
            Self::Other(cc) => *cc,
        }
    }
}

impl fmt::Display for HandlerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", fourcc_to_string(&self.fourcc()))
    }
}

/// 向下传递的解析上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseContext {
    /// 所在轨道的处理器类型
    pub handler: HandlerType,
    /// 文件品牌是否为 QuickTime
    pub quicktime: bool,
}

// ========================
// 文件级
// ========================

/// 文件类型 (ftyp)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTypeBox {
    /// 主品牌
    pub major_brand: [u8; 4],
    /// 次版本
    pub minor_version: u32,
    /// 兼容品牌
    pub compatible_brands: Vec<[u8; 4]>,
}

impl FileTypeBox {
    /// 解析 ftyp
    pub fn parse(b: &mut BoxReader<'_>) -> Mp4TsResult<Self> {
        let major_brand = b.read_tag()?;
        let minor_version = b.read_u32()?;
        let mut compatible_brands = Vec::new();
        while b.remaining() >= 4 {
            compatible_brands.push(b.read_tag()?);
        }
        log::debug!(
            "ftyp: major={}, compatible={}",
            fourcc_to_string(&major_brand),
            compatible_brands.len()
        );
        Ok(Self {
            major_brand,
            minor_version,
            compatible_brands,
        })
    }

    /// 主品牌或兼容品牌之一为 `qt  `
    pub fn is_quicktime(&self) -> bool {
        self.major_brand == QUICKTIME_BRAND || self.compatible_brands.contains(&QUICKTIME_BRAND)
    }
}

/// 已解析的 MP4 文件
#[derive(Debug, Clone)]
pub struct Mp4File {
    /// 文件类型
    pub ftyp: FileTypeBox,
    /// 影片
    pub moov: MovieBox,
    /// 遍历过的全部 box 节点
    pub arena: BoxArena,
}

impl Mp4File {
    /// 从输入流解析 box 树
    ///
    /// 先跳过任意前导 box 直到 `ftyp`, 再继续扫描 `moov`.
    /// `moov` 位于 `ftyp` 之前时先记下它, 得到品牌后再回头解析.
    /// 两者缺一即报告 [`Mp4TsError::MissingRequiredBox`].
    pub fn parse(io: &mut IoContext) -> Mp4TsResult<Self> {
        let mut arena = BoxArena::new();
        let mut ftyp: Option<FileTypeBox> = None;
        let mut moov = None;
        let mut early_moov: Option<NodeId> = None;

        while let Some(mut b) = BoxReader::next_top_level(io, &mut arena)? {
            let quicktime = ftyp.as_ref().map(FileTypeBox::is_quicktime);
            match (b.box_type(), quicktime) {
                (BoxType::Ftyp, None) => {
                    ftyp = Some(FileTypeBox::parse(&mut b)?);
                    if early_moov.is_some() {
                        b.skip_to_end()?;
                        break;
                    }
                }
                (BoxType::Moov, Some(quicktime)) => {
                    moov = Some(MovieBox::parse(&mut b, quicktime)?);
                    b.skip_to_end()?;
                    break;
                }
                (BoxType::Moov, None) if early_moov.is_none() => {
                    log::debug!("moov 位于 ftyp 之前, 稍后解析");
                    early_moov = Some(b.node());
                }
                (other, _) => log::debug!("跳过顶层 box {}", other),
            }
            b.skip_to_end()?;
        }

        let ftyp = ftyp.ok_or_else(|| Mp4TsError::MissingRequiredBox("ftyp".into()))?;
        if let Some(node) = early_moov.filter(|_| moov.is_none()) {
            let mut b = BoxReader::reopen(io, &mut arena, node)?;
            moov = Some(MovieBox::parse(&mut b, ftyp.is_quicktime())?);
            b.skip_to_end()?;
        }
        let moov = moov.ok_or_else(|| Mp4TsError::MissingRequiredBox("moov".into()))?;
        log::debug!("box 树: {} 个节点, {} 个轨道", arena.len(), moov.tracks.len());
        Ok(Self { ftyp, moov, arena })
    }
}

// ========================
// moov
// ========================

/// 影片头部 (mvhd)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieHeaderBox {
    /// 版本 (0 或 1)
    pub version: u8,
    /// 创建时间
    pub creation_time: u64,
    /// 修改时间
    pub modification_time: u64,
    /// 时间刻度
    pub timescale: u32,
    /// 时长
    pub duration: u64,
    /// 播放速率 (16.16)
    pub rate: u32,
    /// 音量 (8.8)
    pub volume: u16,
    /// 下一个轨道 ID
    pub next_track_id: u32,
}

impl MovieHeaderBox {
    /// 解析 mvhd
    pub fn parse(b: &mut BoxReader<'_>) -> Mp4TsResult<Self> {
        let version = b.read_full_box_header()?.version;
        let (creation_time, modification_time, timescale, duration) = if version == 1 {
            (b.read_u64()?, b.read_u64()?, b.read_u32()?, b.read_u64()?)
        } else {
            (
                u64::from(b.read_u32()?),
                u64::from(b.read_u32()?),
                b.read_u32()?,
                u64::from(b.read_u32()?),
            )
        };
        let rate = b.read_u32()?;
        let volume = b.read_u16()?;
        b.skip(2 + 8)?; // reserved
        b.skip(36)?; // matrix
        b.skip(24)?; // pre_defined
        let next_track_id = b.read_u32()?;

        log::debug!("mvhd: timescale={}, duration={}", timescale, duration);
        Ok(Self {
            version,
            creation_time,
            modification_time,
            timescale,
            duration,
            rate,
            volume,
            next_track_id,
        })
    }
}

/// 影片 (moov)
#[derive(Debug, Clone, PartialEq)]
pub struct MovieBox {
    /// 影片头部
    pub mvhd: Option<MovieHeaderBox>,
    /// 音视频轨道 (按文件顺序, 其他类型的轨道已跳过)
    pub tracks: Vec<TrackBox>,
}

impl MovieBox {
    /// 解析 moov
    pub fn parse(b: &mut BoxReader<'_>, quicktime: bool) -> Mp4TsResult<Self> {
        let mut mvhd = None;
        let mut tracks = Vec::new();
        b.for_each_child(|child| {
            match child.box_type() {
                BoxType::Mvhd => mvhd = Some(MovieHeaderBox::parse(child)?),
                BoxType::Trak => {
                    if let Some(track) = TrackBox::parse(child, quicktime)? {
                        tracks.push(track);
                    }
                }
                _ => {}
            }
            Ok(())
        })?;
        Ok(Self { mvhd, tracks })
    }

    /// 第一个视频轨道
    pub fn first_video_track(&self) -> Option<&TrackBox> {
        self.tracks.iter().find(|t| t.handler() == HandlerType::Video)
    }

    /// 第一个音频轨道
    pub fn first_audio_track(&self) -> Option<&TrackBox> {
        self.tracks.iter().find(|t| t.handler() == HandlerType::Audio)
    }
}

// ========================
// trak
// ========================

/// 轨道头部 (tkhd)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackHeaderBox {
    /// 版本 (0 或 1)
    pub version: u8,
    /// 标志 (enabled/in_movie/in_preview)
    pub flags: u32,
    /// 轨道 ID
    pub track_id: u32,
    /// 时长 (影片时间刻度)
    pub duration: u64,
    /// 宽度 (16.16)
    pub width: u32,
    /// 高度 (16.16)
    pub height: u32,
}

impl TrackHeaderBox {
    /// 解析 tkhd
    pub fn parse(b: &mut BoxReader<'_>) -> Mp4TsResult<Self> {
        let header = b.read_full_box_header()?;
        let (track_id, duration) = if header.version == 1 {
            b.skip(16)?; // creation + modification
            let track_id = b.read_u32()?;
            b.skip(4)?;
            (track_id, b.read_u64()?)
        } else {
            b.skip(8)?;
            let track_id = b.read_u32()?;
            b.skip(4)?;
            (track_id, u64::from(b.read_u32()?))
        };
        b.skip(8)?; // reserved
        b.skip(2 + 2 + 2 + 2)?; // layer, alternate_group, volume, reserved
        b.skip(36)?; // matrix
        let width = b.read_u32()?;
        let height = b.read_u32()?;

        Ok(Self {
            version: header.version,
            flags: header.flags,
            track_id,
            duration,
            width,
            height,
        })
    }
}

/// 轨道 (trak)
#[derive(Debug, Clone, PartialEq)]
pub struct TrackBox {
    /// 轨道头部
    pub tkhd: TrackHeaderBox,
    /// 媒体
    pub mdia: MediaBox,
}

impl TrackBox {
    /// 解析 trak
    ///
    /// 处理器既不是视频也不是音频时返回 `None`.
    pub fn parse(b: &mut BoxReader<'_>, quicktime: bool) -> Mp4TsResult<Option<Self>> {
        let mut tkhd = None;
        let mut mdia = None;
        let mut skipped = None;
        b.for_each_child(|child| {
            match child.box_type() {
                BoxType::Tkhd => tkhd = Some(TrackHeaderBox::parse(child)?),
                BoxType::Mdia => match MediaBox::parse(child, quicktime)? {
                    MediaParse::Parsed(m) => mdia = Some(m),
                    MediaParse::Skipped(h) => skipped = Some(h),
                },
                _ => {}
            }
            Ok(())
        })?;

        let tkhd = tkhd.ok_or_else(|| Mp4TsError::MissingRequiredBox(format!("{}/tkhd", b.path())))?;
        if let Some(handler) = skipped {
            log::warn!("跳过轨道 {}: 处理器类型 {} 不受支持", tkhd.track_id, handler);
            return Ok(None);
        }
        let mdia = mdia.ok_or_else(|| Mp4TsError::MissingRequiredBox(format!("{}/mdia", b.path())))?;

        log::debug!(
            "轨道 {}: {}, timescale={}, {} 个采样",
            tkhd.track_id,
            mdia.hdlr.handler_type,
            mdia.mdhd.timescale,
            mdia.minf.stbl.sample_count()
        );
        Ok(Some(Self { tkhd, mdia }))
    }

    /// 处理器类型
    pub fn handler(&self) -> HandlerType {
        self.mdia.hdlr.handler_type
    }

    /// 媒体时间刻度
    pub fn timescale(&self) -> u32 {
        self.mdia.mdhd.timescale
    }

    /// 采样表
    pub fn sample_table(&self) -> &SampleTableBox {
        &self.mdia.minf.stbl
    }
}

// ========================
// mdia
// ========================

/// 媒体头部 (mdhd)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaHeaderBox {
    /// 版本 (0 或 1)
    pub version: u8,
    /// 时间刻度 (非零)
    pub timescale: u32,
    /// 时长
    pub duration: u64,
    /// ISO-639-2/T 语言代码
    pub language: String,
}

impl MediaHeaderBox {
    /// 解析 mdhd
    pub fn parse(b: &mut BoxReader<'_>) -> Mp4TsResult<Self> {
        let version = b.read_full_box_header()?.version;
        let (timescale, duration) = if version == 1 {
            b.skip(16)?;
            (b.read_u32()?, b.read_u64()?)
        } else {
            b.skip(8)?;
            (b.read_u32()?, u64::from(b.read_u32()?))
        };
        if timescale == 0 {
            return Err(Mp4TsError::Malformed(format!("{}: timescale 为 0", b.path())));
        }
        let packed = b.read_u16()?.to_be_bytes();
        let _pre_defined = b.read_u16()?;

        Ok(Self {
            version,
            timescale,
            duration,
            language: decode_language(&packed)?,
        })
    }
}

/// 解码 1 位填充 + 3×5 位的语言代码
fn decode_language(packed: &[u8; 2]) -> Mp4TsResult<String> {
    let mut br = BitReader::new(packed);
    br.skip_bits(1)?;
    let mut language = String::with_capacity(3);
    for _ in 0..3 {
        let code = br.read_bits(5)? as u8;
        language.push(char::from(code + 0x60));
    }
    Ok(language)
}

/// 处理器引用 (hdlr)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerBox {
    /// 处理器类型
    pub handler_type: HandlerType,
}

impl HandlerBox {
    /// 解析 hdlr, 名称字符串忽略
    pub fn parse(b: &mut BoxReader<'_>) -> Mp4TsResult<Self> {
        b.read_full_box_header()?;
        let _pre_defined = b.read_u32()?;
        let handler_type = HandlerType::from_fourcc(&b.read_tag()?);
        Ok(Self { handler_type })
    }
}

/// mdia 解析结果
enum MediaParse {
    Parsed(MediaBox),
    Skipped(HandlerType),
}

/// 媒体 (mdia)
#[derive(Debug, Clone, PartialEq)]
pub struct MediaBox {
    /// 媒体头部
    pub mdhd: MediaHeaderBox,
    /// 处理器引用
    pub hdlr: HandlerBox,
    /// 媒体信息
    pub minf: MediaInformationBox,
}

impl MediaBox {
    fn parse(b: &mut BoxReader<'_>, quicktime: bool) -> Mp4TsResult<MediaParse> {
        let mut mdhd = None;
        let mut hdlr: Option<HandlerBox> = None;
        let mut minf = None;
        b.for_each_child(|child| {
            match child.box_type() {
                BoxType::Mdhd => mdhd = Some(MediaHeaderBox::parse(child)?),
                BoxType::Hdlr => hdlr = Some(HandlerBox::parse(child)?),
                BoxType::Minf => {
                    let handler = match &hdlr {
                        Some(h) => h.handler_type,
                        None => {
                            return Err(Mp4TsError::Malformed(format!(
                                "{}: minf 出现在 hdlr 之前",
                                child.path()
                            )));
                        }
                    };
                    if matches!(handler, HandlerType::Video | HandlerType::Audio) {
                        let ctx = ParseContext { handler, quicktime };
                        minf = Some(MediaInformationBox::parse(child, ctx)?);
                    }
                }
                _ => {}
            }
            Ok(())
        })?;

        let path = b.path();
        let hdlr = hdlr.ok_or_else(|| Mp4TsError::MissingRequiredBox(format!("{}/hdlr", path)))?;
        if let HandlerType::Other(_) = hdlr.handler_type {
            return Ok(MediaParse::Skipped(hdlr.handler_type));
        }
        let mdhd = mdhd.ok_or_else(|| Mp4TsError::MissingRequiredBox(format!("{}/mdhd", path)))?;
        let minf = minf.ok_or_else(|| Mp4TsError::MissingRequiredBox(format!("{}/minf", path)))?;
        Ok(MediaParse::Parsed(Self { mdhd, hdlr, minf }))
    }
}

// ========================
// minf
// ========================

/// 数据引用条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataEntry {
    /// 条目类型 (`url ` / `urn `)
    pub entry_type: [u8; 4],
    /// 标志 (1 = 媒体数据在本文件内)
    pub flags: u32,
}

/// 数据信息 (dinf → dref)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataInformationBox {
    /// 唯一的数据引用条目
    pub entry: DataEntry,
}

impl DataInformationBox {
    /// 解析 dinf
    ///
    /// 只接受一个自包含 (flags == 1) 的数据引用.
    pub fn parse(b: &mut BoxReader<'_>) -> Mp4TsResult<Self> {
        let mut entry = None;
        b.for_each_child(|child| {
            if child.box_type() != BoxType::Dref {
                return Err(Mp4TsError::Malformed(format!(
                    "{}: dinf 中只允许 dref",
                    child.path()
                )));
            }
            entry = Some(parse_dref(child)?);
            Ok(())
        })?;
        let entry = entry.ok_or_else(|| Mp4TsError::MissingRequiredBox(format!("{}/dref", b.path())))?;
        Ok(Self { entry })
    }
}

fn parse_dref(b: &mut BoxReader<'_>) -> Mp4TsResult<DataEntry> {
    b.read_full_box_header()?;
    let entry_count = b.read_u32()?;
    if entry_count != 1 {
        return Err(Mp4TsError::UnsupportedCodec(format!(
            "dref 条目数为 {}, 仅支持单一数据源",
            entry_count
        )));
    }
    let mut entry = None;
    b.for_each_child(|child| {
        let header = child.read_full_box_header()?;
        if header.flags != 1 {
            return Err(Mp4TsError::UnsupportedCodec(format!(
                "{}: 外部数据引用 (flags=0x{:06X}) 不受支持",
                child.path(),
                header.flags
            )));
        }
        entry = Some(DataEntry {
            entry_type: child.box_type().fourcc(),
            flags: header.flags,
        });
        Ok(())
    })?;
    entry.ok_or_else(|| Mp4TsError::MissingRequiredBox(format!("{} 数据引用条目", b.path())))
}

/// 媒体信息 (minf)
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInformationBox {
    /// 数据信息
    pub dinf: Option<DataInformationBox>,
    /// 采样表
    pub stbl: SampleTableBox,
}

impl MediaInformationBox {
    /// 解析 minf, vmhd/smhd 整体跳过
    pub fn parse(b: &mut BoxReader<'_>, ctx: ParseContext) -> Mp4TsResult<Self> {
        let mut dinf = None;
        let mut stbl = None;
        b.for_each_child(|child| {
            match child.box_type() {
                BoxType::Dinf => dinf = Some(DataInformationBox::parse(child)?),
                BoxType::Stbl => stbl = Some(SampleTableBox::parse(child, ctx)?),
                _ => {}
            }
            Ok(())
        })?;
        let stbl = stbl.ok_or_else(|| Mp4TsError::MissingRequiredBox(format!("{}/stbl", b.path())))?;
        Ok(Self { dinf, stbl })
    }
}
