//! MP4 Box (Atom) 读取器.
//!
//! ISO 14496-12 定义的 Box 结构:
//! ```text
//! Size:       4 bytes (big-endian, 含头部本身)
//! Type:       4 bytes (FourCC)
//! [ExtSize]:  8 bytes (仅当 Size==1 时存在, 64-bit 大小)
//! ```
//!
//! 特殊大小值:
//! - 0: Box 延伸到父容器 (顶层为文件) 末尾
//! - 1: 使用 64-bit 扩展大小
//!
//! [`BoxReader`] 跟踪每个 box 已消耗的字节数, 所有读取与跳过都受声明大小约束.
//! 遍历过的 box 依次登记到 [`BoxArena`], 节点以下标引用父节点.

use std::fmt;
use std::io::SeekFrom;

use mp4ts_core::{Mp4TsError, Mp4TsResult};

use crate::io::IoContext;

/// Box 类型枚举 (本库识别的 FourCC)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxType {
    /// ftyp - 文件类型
    Ftyp,
    /// moov - 影片元数据
    Moov,
    /// mvhd - 影片头部
    Mvhd,
    /// trak - 轨道
    Trak,
    /// tkhd - 轨道头部
    Tkhd,
    /// mdia - 媒体
    Mdia,
    /// mdhd - 媒体头部
    Mdhd,
    /// hdlr - 处理器引用
    Hdlr,
    /// minf - 媒体信息
    Minf,
    /// vmhd - 视频媒体头部
    Vmhd,
    /// smhd - 音频媒体头部
    Smhd,
    /// dinf - 数据信息
    Dinf,
    /// dref - 数据引用
    Dref,
    /// stbl - 采样表
    Stbl,
    /// stsd - 采样描述
    Stsd,
    /// stts - 时间→采样映射
    Stts,
    /// ctts - 合成时间偏移
    Ctts,
    /// stss - 同步采样
    Stss,
    /// stsc - 采样→块映射
    Stsc,
    /// stsz - 采样大小
    Stsz,
    /// stco - 块偏移 (32位)
    Stco,
    /// co64 - 块偏移 (64位)
    Co64,
    /// avc1 - AVC 视觉采样条目
    Avc1,
    /// avcC - AVC 解码器配置
    AvcC,
    /// mp4a - AAC 音频采样条目
    Mp4a,
    /// esds - 基本流描述符
    Esds,
    /// wave - QuickTime 音频扩展容器
    Wave,
    /// mdat - 媒体数据
    Mdat,
    /// free - 自由空间
    Free,
    /// skip - 跳过
    Skip,
    /// 未知 box 类型
    Unknown([u8; 4]),
}

impl BoxType {
    /// 从 4 字节 FourCC 创建
    pub fn from_fourcc(fourcc: &[u8; 4]) -> Self {
        match fourcc {
            b"ftyp" => Self::Ftyp,
            b"moov" => Self::Moov,
            b"mvhd" => Self::Mvhd,
            b"trak" => Self::Trak,
            b"tkhd" => Self::Tkhd,
            b"mdia" => Self::Mdia,
            b"mdhd" => Self::Mdhd,
            b"hdlr" => Self::Hdlr,
            b"minf" => Self::Minf,
            b"vmhd" => Self::Vmhd,
            b"smhd" => Self::Smhd,
            b"dinf" => Self::Dinf,
            b"dref" => Self::Dref,
            b"stbl" => Self::Stbl,
            b"stsd" => Self::Stsd,
            b"stts" => Self::Stts,
            b"ctts" => Self::Ctts,
            b"stss" => Self::Stss,
            b"stsc" => Self::Stsc,
            b"stsz" => Self::Stsz,
            b"stco" => Self::Stco,
            b"co64" => Self::Co64,
            b"avc1" => Self::Avc1,
            b"avcC" => Self::AvcC,
            b"mp4a" => Self::Mp4a,
            b"esds" => Self::Esds,
            b"wave" => Self::Wave,
            b"mdat" => Self::Mdat,
            b"free" => Self::Free,
            b"skip" => Self::Skip,
            _ => Self::Unknown(*fourcc),
        }
    }

    /// 还原为 4 字节 FourCC
    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            Self::Ftyp => *b"ftyp",
            Self::Moov => *b"moov",
            Self::Mvhd => *b"mvhd",
            Self::Trak => *b"trak",
            Self::Tkhd => *b"tkhd",
            Self::Mdia => *b"mdia",
            Self::Mdhd => *b"mdhd",
            Self::Hdlr => *b"hdlr",
            Self::Minf => *b"minf",
            Self::Vmhd => *b"vmhd",
            Self::Smhd => *b"smhd",
            Self::Dinf => *b"dinf",
            Self::Dref => *b"dref",
            Self::Stbl => *b"stbl",
            Self::Stsd => *b"stsd",
            Self::Stts => *b"stts",
            Self::Ctts => *b"ctts",
            Self::Stss => *b"stss",
            Self::Stsc => *b"stsc",
            Self::Stsz => *b"stsz",
            Self::Stco => *b"stco",
            Self::Co64 => *b"co64",
            Self::Avc1 => *b"avc1",
            Self::AvcC => *b"avcC",
            Self::Mp4a => *b"mp4a",
            Self::Esds => *b"esds",
            Self::Wave => *b"wave",
            Self::Mdat => *b"mdat",
            Self::Free => *b"free",
            Self::Skip => *b"skip",
            Self::Unknown(cc) => *cc,
        }
    }
}

impl fmt::Display for BoxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", fourcc_to_string(&self.fourcc()))
    }
}

/// 把 FourCC 转为可打印字符串, 非 ASCII 字节以 '?' 代替
pub fn fourcc_to_string(cc: &[u8; 4]) -> String {
    cc.iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '?'
            }
        })
        .collect()
}

/// 已解析的 Box 头部
#[derive(Debug, Clone, Copy)]
pub struct BoxHeader {
    /// Box 类型
    pub box_type: BoxType,
    /// Box 总大小 (含头部, size==0 时已解析为到容器末尾的实际大小)
    pub size: u64,
    /// 头部大小 (8 或 16 字节)
    pub header_size: u64,
    /// Box 在文件中的起始偏移
    pub offset: u64,
}

impl BoxHeader {
    /// 内容区域大小 (不含头部)
    pub fn content_size(&self) -> u64 {
        self.size - self.header_size
    }

    /// Box 结束位置 (不含)
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// 读取一个 Box 头部
///
/// `container_end` 为所在容器的结束位置, 用于解析 size==0 的 box;
/// 顶层 box 传 `None`, 以文件总大小代替.
pub fn read_box_header(io: &mut IoContext, container_end: Option<u64>) -> Mp4TsResult<BoxHeader> {
    let offset = io.position()?;
    let size32 = io.read_u32_be()?;
    let fourcc = io.read_tag()?;
    let box_type = BoxType::from_fourcc(&fourcc);

    let (size, header_size) = match size32 {
        // 64-bit 扩展大小
        1 => (io.read_u64_be()?, 16u64),
        // 延伸到容器末尾
        0 => {
            let end = container_end.or_else(|| io.size()).ok_or_else(|| {
                Mp4TsError::Malformed(format!("{} box 大小为 0 但流长度未知", box_type))
            })?;
            (end.saturating_sub(offset), 8u64)
        }
        n => (u64::from(n), 8u64),
    };

    if size < header_size {
        return Err(Mp4TsError::Malformed(format!(
            "{} box 大小 {} 小于头部大小 {}",
            box_type, size, header_size
        )));
    }

    Ok(BoxHeader {
        box_type,
        size,
        header_size,
        offset,
    })
}

/// FullBox 的版本与标志
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FullBoxHeader {
    /// 版本
    pub version: u8,
    /// 24-bit 标志
    pub flags: u32,
}

/// Box 节点下标
pub type NodeId = usize;

/// Box 树节点
#[derive(Debug, Clone)]
pub struct BoxNode {
    /// Box 类型
    pub box_type: BoxType,
    /// 文件偏移
    pub offset: u64,
    /// 总大小
    pub size: u64,
    /// 父节点 (顶层 box 为 None)
    pub parent: Option<NodeId>,
}

/// Box 树节点表
///
/// 解析时按遍历顺序登记每个 box, 节点只保存自身信息与父节点下标.
#[derive(Debug, Clone, Default)]
pub struct BoxArena {
    nodes: Vec<BoxNode>,
}

impl BoxArena {
    /// 创建空节点表
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, node: BoxNode) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// 按下标获取节点
    pub fn get(&self, id: NodeId) -> Option<&BoxNode> {
        self.nodes.get(id)
    }

    /// 节点数量
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 所有节点 (按遍历顺序)
    pub fn nodes(&self) -> &[BoxNode] {
        &self.nodes
    }

    /// 节点深度 (顶层为 0)
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut cur = self.get(id).and_then(|n| n.parent);
        while let Some(parent) = cur {
            depth += 1;
            cur = self.get(parent).and_then(|n| n.parent);
        }
        depth
    }

    /// 节点路径, 如 `moov/trak/mdia`
    pub fn path(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut cur = Some(id);
        while let Some(node_id) = cur {
            match self.get(node_id) {
                Some(node) => {
                    parts.push(node.box_type.to_string());
                    cur = node.parent;
                }
                None => break,
            }
        }
        parts.reverse();
        parts.join("/")
    }
}

/// 有界 Box 读取器
///
/// 持有一个已读头部的 box, 在其声明大小内提供基本类型读取.
/// 读取器销毁前应调用 [`BoxReader::skip_to_end`] 使游标等于 box 大小,
/// [`BoxReader::for_each_child`] 会对每个子 box 自动完成这一步.
pub struct BoxReader<'a> {
    io: &'a mut IoContext,
    arena: &'a mut BoxArena,
    header: BoxHeader,
    node: NodeId,
    /// 已消耗字节数 (含头部)
    consumed: u64,
}

impl<'a> BoxReader<'a> {
    /// 读取下一个顶层 box
    ///
    /// 流结束时返回 `None`.
    pub fn next_top_level(
        io: &'a mut IoContext,
        arena: &'a mut BoxArena,
    ) -> Mp4TsResult<Option<Self>> {
        if io.is_eof()? {
            return Ok(None);
        }
        let header = match read_box_header(io, None) {
            Ok(header) => header,
            // 文件末尾残留不足一个头部的字节
            Err(Mp4TsError::Truncated) => return Ok(None),
            Err(e) => return Err(e),
        };
        let node = arena.push(BoxNode {
            box_type: header.box_type,
            offset: header.offset,
            size: header.size,
            parent: None,
        });
        log::trace!(
            "顶层 box: {} @{} 大小 {}",
            header.box_type,
            header.offset,
            header.size
        );
        Ok(Some(Self {
            io,
            arena,
            header,
            node,
            consumed: header.header_size,
        }))
    }

    /// 回到已登记的顶层 box 重新读取
    ///
    /// 复用原节点, 子 box 登记在它之下.
    pub fn reopen(io: &'a mut IoContext, arena: &'a mut BoxArena, node: NodeId) -> Mp4TsResult<Self> {
        let offset = arena
            .get(node)
            .map(|n| n.offset)
            .ok_or_else(|| Mp4TsError::Malformed(format!("box 节点 {} 不存在", node)))?;
        io.seek(SeekFrom::Start(offset))?;
        let header = read_box_header(io, None)?;
        log::trace!("重新读取顶层 box: {} @{}", header.box_type, offset);
        Ok(Self {
            io,
            arena,
            header,
            node,
            consumed: header.header_size,
        })
    }

    /// Box 类型
    pub fn box_type(&self) -> BoxType {
        self.header.box_type
    }

    /// Box 头部
    pub fn header(&self) -> &BoxHeader {
        &self.header
    }

    /// 在节点表中的下标
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// 从顶层到本 box 的路径
    pub fn path(&self) -> String {
        self.arena.path(self.node)
    }

    /// 已消耗字节数 (含头部)
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// 剩余未消耗字节数
    pub fn remaining(&self) -> u64 {
        self.header.size - self.consumed
    }

    /// 登记即将读取的字节数, 越过声明大小时报错
    fn advance(&mut self, n: u64) -> Mp4TsResult<()> {
        if n > self.remaining() {
            return Err(Mp4TsError::Malformed(format!(
                "{} 读取越界: 已消耗 {}, 请求 {}, box 大小 {}",
                self.path(),
                self.consumed,
                n,
                self.header.size
            )));
        }
        self.consumed += n;
        Ok(())
    }

    /// 读取 1 个字节
    pub fn read_u8(&mut self) -> Mp4TsResult<u8> {
        self.advance(1)?;
        self.io.read_u8()
    }

    /// 读取 u16 大端
    pub fn read_u16(&mut self) -> Mp4TsResult<u16> {
        self.advance(2)?;
        self.io.read_u16_be()
    }

    /// 读取 u24 大端
    pub fn read_u24(&mut self) -> Mp4TsResult<u32> {
        self.advance(3)?;
        self.io.read_u24_be()
    }

    /// 读取 u32 大端
    pub fn read_u32(&mut self) -> Mp4TsResult<u32> {
        self.advance(4)?;
        self.io.read_u32_be()
    }

    /// 读取 u64 大端
    pub fn read_u64(&mut self) -> Mp4TsResult<u64> {
        self.advance(8)?;
        self.io.read_u64_be()
    }

    /// 读取 4 字节标签
    pub fn read_tag(&mut self) -> Mp4TsResult<[u8; 4]> {
        self.advance(4)?;
        self.io.read_tag()
    }

    /// 读取定长字节数组
    pub fn read_bytes(&mut self, count: usize) -> Mp4TsResult<Vec<u8>> {
        self.advance(count as u64)?;
        self.io.read_bytes(count)
    }

    /// 读取 N 个连续的 u32
    pub fn read_u32_array(&mut self, count: u32) -> Mp4TsResult<Vec<u32>> {
        self.advance(u64::from(count) * 4)?;
        let mut values = Vec::with_capacity(count as usize);
        for _ in 0..count {
            values.push(self.io.read_u32_be()?);
        }
        Ok(values)
    }

    /// 读取定宽的长度前缀字符串
    ///
    /// 首字节为有效长度, 必须小于 `width`, 其后补齐到 `width` 字节.
    pub fn read_fixed_string(&mut self, width: usize) -> Mp4TsResult<String> {
        let raw = self.read_bytes(width)?;
        let len = raw.first().copied().unwrap_or(0) as usize;
        if len >= width {
            return Err(Mp4TsError::Malformed(format!(
                "{} 定宽字符串长度 {} 超过 {}",
                self.path(),
                len,
                width - 1
            )));
        }
        Ok(String::from_utf8_lossy(&raw[1..=len]).into_owned())
    }

    /// 读取 FullBox 的 version(1) + flags(3)
    pub fn read_full_box_header(&mut self) -> Mp4TsResult<FullBoxHeader> {
        let version = self.read_u8()?;
        let flags = self.read_u24()?;
        Ok(FullBoxHeader { version, flags })
    }

    /// 跳过指定字节数 (不得越过 box 末尾)
    pub fn skip(&mut self, count: u64) -> Mp4TsResult<()> {
        self.advance(count)?;
        self.io.skip(count)
    }

    /// 跳过 box 剩余内容
    pub fn skip_to_end(&mut self) -> Mp4TsResult<()> {
        let remaining = self.remaining();
        self.skip(remaining)
    }

    /// 依次读取子 box
    ///
    /// 对每个子 box 调用 `f`, 回调返回后自动跳过子 box 中未读的内容,
    /// 并把子 box 的完整大小计入本 box 的游标. 剩余空间不足一个头部
    /// (或流已结束) 时停止.
    pub fn for_each_child<F>(&mut self, mut f: F) -> Mp4TsResult<()>
    where
        F: FnMut(&mut BoxReader<'_>) -> Mp4TsResult<()>,
    {
        while self.remaining() >= 8 {
            if self.io.is_eof()? {
                break;
            }
            let header = read_box_header(self.io, Some(self.header.end()))?;
            if header.size > self.remaining() {
                return Err(Mp4TsError::Malformed(format!(
                    "{} 的子 box {} 大小 {} 超过剩余空间 {}",
                    self.path(),
                    header.box_type,
                    header.size,
                    self.remaining()
                )));
            }
            let node = self.arena.push(BoxNode {
                box_type: header.box_type,
                offset: header.offset,
                size: header.size,
                parent: Some(self.node),
            });

            let mut child = BoxReader {
                io: &mut *self.io,
                arena: &mut *self.arena,
                header,
                node,
                consumed: header.header_size,
            };
            log::trace!("box: {} @{} 大小 {}", child.path(), header.offset, header.size);
            f(&mut child)?;
            child.skip_to_end()?;

            self.consumed += header.size;
        }
        // 不足一个头部的尾随字节
        self.skip_to_end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 构造一个普通 box
    fn build_box(tag: &[u8; 4], content: &[u8]) -> Vec<u8> {
        let size = (8 + content.len()) as u32;
        let mut data = Vec::with_capacity(size as usize);
        data.extend_from_slice(&size.to_be_bytes());
        data.extend_from_slice(tag);
        data.extend_from_slice(content);
        data
    }

    #[test]
    fn test_box_type_识别() {
        assert_eq!(BoxType::from_fourcc(b"ftyp"), BoxType::Ftyp);
        assert_eq!(BoxType::from_fourcc(b"avcC"), BoxType::AvcC);
        assert_eq!(BoxType::from_fourcc(b"co64"), BoxType::Co64);
        assert!(matches!(BoxType::from_fourcc(b"xxxx"), BoxType::Unknown(_)));
        assert_eq!(BoxType::Unknown(*b"udta").to_string(), "udta");
        assert_eq!(BoxType::Stbl.to_string(), "stbl");
    }

    #[test]
    fn test_普通头部() {
        let mut io = IoContext::from_memory(build_box(b"free", &[0u8; 8]));
        let header = read_box_header(&mut io, None).unwrap();
        assert_eq!(header.box_type, BoxType::Free);
        assert_eq!(header.size, 16);
        assert_eq!(header.header_size, 8);
        assert_eq!(header.content_size(), 8);
    }

    #[test]
    fn test_64位扩展大小() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(b"mdat");
        data.extend_from_slice(&20u64.to_be_bytes());
        data.extend_from_slice(&[0xAA; 4]);
        let mut io = IoContext::from_memory(data);
        let header = read_box_header(&mut io, None).unwrap();
        assert_eq!(header.box_type, BoxType::Mdat);
        assert_eq!(header.size, 20);
        assert_eq!(header.header_size, 16);
    }

    #[test]
    fn test_大小为0延伸到文件末尾() {
        let mut data = Vec::new();
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(b"mdat");
        data.extend_from_slice(&[0u8; 100]);
        let mut io = IoContext::from_memory(data);
        let header = read_box_header(&mut io, None).unwrap();
        assert_eq!(header.size, 108);
    }

    #[test]
    fn test_大小小于头部报错() {
        let mut data = Vec::new();
        data.extend_from_slice(&4u32.to_be_bytes());
        data.extend_from_slice(b"free");
        let mut io = IoContext::from_memory(data);
        assert!(matches!(
            read_box_header(&mut io, None),
            Err(Mp4TsError::Malformed(_))
        ));
    }

    #[test]
    fn test_读取与跳过受边界约束() {
        let mut io = IoContext::from_memory(build_box(b"free", &[1, 2, 3, 4, 5, 6]));
        let mut arena = BoxArena::new();
        let mut b = BoxReader::next_top_level(&mut io, &mut arena).unwrap().unwrap();
        assert_eq!(b.read_u16().unwrap(), 0x0102);
        assert_eq!(b.consumed(), 10);
        assert!(matches!(b.skip(5), Err(Mp4TsError::Malformed(_))));
        b.skip(3).unwrap();
        assert_eq!(b.read_u8().unwrap(), 6);
        assert_eq!(b.remaining(), 0);
        assert!(matches!(b.read_u8(), Err(Mp4TsError::Malformed(_))));
    }

    #[test]
    fn test_声明大小超过文件返回截断() {
        let mut data = build_box(b"free", &[1, 2]);
        data[3] = 32; // 声明 32 字节, 实际只有 10 字节
        let mut io = IoContext::from_memory(data);
        let mut arena = BoxArena::new();
        let mut b = BoxReader::next_top_level(&mut io, &mut arena).unwrap().unwrap();
        assert!(matches!(b.read_u32(), Err(Mp4TsError::Truncated)));
    }

    #[test]
    fn test_定宽字符串() {
        let mut content = vec![0u8; 32];
        content[0] = 5;
        content[1..6].copy_from_slice(b"x264!");
        let mut io = IoContext::from_memory(build_box(b"free", &content));
        let mut arena = BoxArena::new();
        let mut b = BoxReader::next_top_level(&mut io, &mut arena).unwrap().unwrap();
        assert_eq!(b.read_fixed_string(32).unwrap(), "x264!");
        assert_eq!(b.remaining(), 0);
    }

    #[test]
    fn test_定宽字符串长度越界() {
        let mut content = vec![0u8; 32];
        content[0] = 32;
        let mut io = IoContext::from_memory(build_box(b"free", &content));
        let mut arena = BoxArena::new();
        let mut b = BoxReader::next_top_level(&mut io, &mut arena).unwrap().unwrap();
        assert!(matches!(
            b.read_fixed_string(32),
            Err(Mp4TsError::Malformed(_))
        ));
    }

    #[test]
    fn test_遍历子box并登记节点表() {
        let inner = [
            build_box(b"mvhd", &[0u8; 4]),
            build_box(b"udta", &[0u8; 12]),
            build_box(b"trak", &build_box(b"tkhd", &[0u8; 2])),
        ]
        .concat();
        let mut data = build_box(b"moov", &inner);
        data.extend_from_slice(&build_box(b"mdat", &[0u8; 3]));

        let mut io = IoContext::from_memory(data);
        let mut arena = BoxArena::new();
        let mut seen = Vec::new();
        {
            let mut moov = BoxReader::next_top_level(&mut io, &mut arena).unwrap().unwrap();
            moov.for_each_child(|child| {
                seen.push(child.box_type());
                if child.box_type() == BoxType::Trak {
                    child.for_each_child(|_| Ok(()))?;
                }
                Ok(())
            })
            .unwrap();
            assert_eq!(moov.remaining(), 0);
        }
        assert_eq!(
            seen,
            vec![BoxType::Mvhd, BoxType::Unknown(*b"udta"), BoxType::Trak]
        );
        assert_eq!(arena.len(), 5);
        assert_eq!(arena.path(4), "moov/trak/tkhd");
        assert_eq!(arena.depth(4), 2);

        let mdat = BoxReader::next_top_level(&mut io, &mut arena).unwrap().unwrap();
        assert_eq!(mdat.box_type(), BoxType::Mdat);
        assert_eq!(mdat.header().offset, 58);
    }

    #[test]
    fn test_子box越过父容器报错() {
        let mut child = build_box(b"tkhd", &[0u8; 4]);
        child[3] = 64;
        let data = build_box(b"trak", &child);
        let mut io = IoContext::from_memory(data);
        let mut arena = BoxArena::new();
        let mut trak = BoxReader::next_top_level(&mut io, &mut arena).unwrap().unwrap();
        assert!(matches!(
            trak.for_each_child(|_| Ok(())),
            Err(Mp4TsError::Malformed(_))
        ));
    }

    #[test]
    fn test_文件末尾结束遍历() {
        let mut io = IoContext::from_memory(build_box(b"free", &[]));
        let mut arena = BoxArena::new();
        let mut count = 0;
        while let Some(mut b) = BoxReader::next_top_level(&mut io, &mut arena).unwrap() {
            b.skip_to_end().unwrap();
            count += 1;
        }
        assert_eq!(count, 1);
    }

    #[test]
    fn test_重新读取已登记的顶层box() {
        let mut data = build_box(b"free", &[0xAB, 0xCD]);
        data.extend_from_slice(&build_box(b"skip", &[]));
        let mut io = IoContext::from_memory(data);
        let mut arena = BoxArena::new();
        while let Some(mut b) = BoxReader::next_top_level(&mut io, &mut arena).unwrap() {
            b.skip_to_end().unwrap();
        }
        assert_eq!(arena.len(), 2);

        let mut b = BoxReader::reopen(&mut io, &mut arena, 0).unwrap();
        assert_eq!(b.box_type(), BoxType::Free);
        assert_eq!(b.node(), 0);
        assert_eq!(b.read_u16().unwrap(), 0xABCD);
        assert_eq!(arena.len(), 2);

        assert!(matches!(
            BoxReader::reopen(&mut io, &mut arena, 5),
            Err(Mp4TsError::Malformed(_))
        ));
    }
}
