//! 抓包回放工具：导入 JSON Lines 抓包，完成转换后执行路径查询并逐行打印命中元素。
//!
//! # 使用方法
//! ```bash
//! cargo run --bin prism-replay -- --capture traffic.jsonl --query "$.header.'Content-Type'" \
//!     --config prism.toml
//! ```
//! - `--capture`：必填，JSON Lines 抓包文件；
//! - `--query`：必填，以 `$` 开头的路径表达式，对每条消息分别求值；
//! - `--config`：可选，TOML 配置文件，缺省时使用内置默认值。
//!
//! 输出格式为 `<消息序号>\t<元素编号>\t<原始内容>`，原始内容按 UTF-8 有损解码。

use std::{env, path::PathBuf};

use anyhow::{Context, bail};
use prism_capture::{CaptureSession, PrismConfig, observability};
use prism_pipeline::ShutdownMode;

struct Options {
    capture: PathBuf,
    query: String,
    config: Option<PathBuf>,
}

fn main() {
    if let Err(error) = run() {
        eprintln!("prism-replay failed: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let options = parse_args(env::args().skip(1))?;
    let config = match &options.config {
        Some(path) => PrismConfig::load(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => PrismConfig::default(),
    };
    observability::install(&config.logging.filter)?;

    let session = CaptureSession::new(config)?;
    let summary = session
        .import_file(&options.capture)
        .with_context(|| format!("importing {}", options.capture.display()))?;
    session
        .wait(None)
        .context("waiting for conversion")?;

    let messages = session.messages();
    let query = prism_core::PathQuery::parse(&options.query)?;
    let mut hits = 0usize;
    for (position, message) in messages.iter().enumerate() {
        for element in query.execute(message, None)? {
            println!("{position}\t{}\t{}", element.id(), element.raw_string_content());
            hits += 1;
        }
    }
    session.shutdown(ShutdownMode::Graceful);
    eprintln!(
        "{} messages imported, {} duplicates skipped, {hits} matches",
        summary.imported, summary.duplicates
    );
    Ok(())
}

fn parse_args(args: impl Iterator<Item = String>) -> anyhow::Result<Options> {
    let mut args = args;
    let mut capture = None;
    let mut query = None;
    let mut config = None;
    while let Some(flag) = args.next() {
        let mut value = |name: &str| {
            args.next()
                .with_context(|| format!("{name} requires a value\n{USAGE}"))
        };
        match flag.as_str() {
            "--capture" => capture = Some(PathBuf::from(value("--capture")?)),
            "--query" => query = Some(value("--query")?),
            "--config" => config = Some(PathBuf::from(value("--config")?)),
            "-h" | "--help" => bail!("{USAGE}"),
            unknown => bail!("unknown argument `{unknown}`\n{USAGE}"),
        }
    }
    Ok(Options {
        capture: capture.with_context(|| format!("--capture is required\n{USAGE}"))?,
        query: query.with_context(|| format!("--query is required\n{USAGE}"))?,
        config,
    })
}

const USAGE: &str = "usage: prism-replay --capture <file.jsonl> --query <path> [--config <prism.toml>]";
