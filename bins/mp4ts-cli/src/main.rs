//! mp4ts - MP4 转 MPEG-TS 命令行工具
//!
//! 读取 H.264/AAC 的 MP4 文件, 不重新编码, 重封装为 MPEG-2 传输流.

mod dump;
mod logging;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use log::{error, info};
use std::process;

use mp4ts_format::{IoContext, Mp4File, Mp4ToTs};

use crate::dump::MetadataDump;

/// MP4 转 MPEG-TS 重封装工具
#[derive(Parser, Debug)]
#[command(name = "mp4ts", version, about = "纯 Rust MP4 → MPEG-TS 重封装工具")]
struct Cli {
    /// 输入 MP4 文件路径
    input: String,

    /// 输出 TS 文件路径
    #[arg(default_value = "result.ts")]
    output: String,

    /// 日志详细程度 (-v=debug, -vv=trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// 只输出解析到的元数据, 不进行转换
    #[arg(long)]
    dump: bool,

    /// 与 --dump 一起使用, 以 JSON 格式输出
    #[arg(long, requires = "dump")]
    json: bool,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init("mp4ts", cli.verbose) {
        eprintln!("警告: 日志初始化失败: {e:#}");
    }

    if let Err(e) = run(&cli) {
        error!("{e:#}");
        eprintln!("错误: {e:#}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut input = IoContext::open_read(&cli.input)
        .with_context(|| format!("无法打开输入文件 '{}'", cli.input))?;

    let file = Mp4File::parse(&mut input)
        .with_context(|| format!("无法解析 MP4 文件 '{}'", cli.input))?;

    if cli.dump {
        let dump = MetadataDump::collect(&file);
        if cli.json {
            println!("{}", dump.to_json().context("序列化元数据失败")?);
        } else {
            print!("{dump}");
        }
        return Ok(());
    }

    let converter = Mp4ToTs::new(&file.moov).context("输入文件中没有可转换的轨道")?;

    let mut output = IoContext::open_write(&cli.output)
        .with_context(|| format!("无法创建输出文件 '{}'", cli.output))?;

    converter
        .convert(&mut input, &mut output)
        .with_context(|| format!("转换 '{}' → '{}' 失败", cli.input, cli.output))?;
    info!("输出文件: {}", cli.output);
    Ok(())
}
