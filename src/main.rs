//! 命令行入口
//!
//! 读取 HTML 文件，模拟自上而下滚动，把译文写回页面后输出。

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use std::sync::Arc;

use clap::{CommandFactory, FromArgMatches, Parser};
use tokio::sync::{broadcast, watch};
use tokio::task::LocalSet;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use xplaino::env::{
    core::{LogLevel, NoColor},
    generate_env_docs,
    translation::AccessToken,
    EnvVar,
};
use xplaino::parsers::{html_to_dom, serialize_document};
use xplaino::translation::{
    ConfigManager, DisplayMode, EstimatedLayout, NetworkTranslator, ProviderTier, SessionEvent,
    StaticCredentials, TextExtractor, TranslationManager, ViewMode, Viewport,
};

/// Xplaino CLI.
#[derive(Parser)]
#[command(name = "xplaino")]
#[command(about = "Translate an HTML page in place through a streaming translation service")]
#[command(version)]
struct Cli {
    /// Input HTML file ("-" reads stdin)
    input: String,

    /// Target language code
    #[arg(short, long)]
    target: Option<String>,

    /// Display mode: append or replace
    #[arg(short, long)]
    mode: Option<DisplayMode>,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Streaming translation endpoint
    #[arg(long)]
    api_url: Option<String>,

    /// Bearer token for the translation endpoint
    #[arg(long)]
    token: Option<String>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<String>,

    /// Document charset
    #[arg(short, long, default_value = "utf-8")]
    encoding: String,

    /// Simulated viewport height in pixels
    #[arg(long, default_value_t = 800.0)]
    viewport_height: f64,

    /// Keep the translation in the page but show the original text
    #[arg(long)]
    show_original: bool,
}

fn init_tracing() {
    let level = LogLevel::get_or_default("info".to_string());
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("xplaino={}", level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(!NoColor::get_or_default(false)),
        )
        .init();
}

fn read_input(input: &str) -> io::Result<Vec<u8>> {
    if input == "-" {
        let mut data = Vec::new();
        io::stdin().read_to_end(&mut data)?;
        Ok(data)
    } else {
        fs::read(input)
    }
}

fn main() -> ExitCode {
    init_tracing();
    let matches = Cli::command()
        .after_long_help(generate_env_docs())
        .get_matches();
    let cli = match Cli::from_arg_matches(&matches) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("创建运行时失败: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let local = LocalSet::new();
    match local.block_on(&runtime, run(cli)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// 返回是否没有出现服务错误
async fn run(cli: Cli) -> Result<bool, Box<dyn std::error::Error>> {
    let manager_config = match &cli.config {
        Some(path) => ConfigManager::from_file(path)?,
        None => ConfigManager::new()?,
    };
    let target = cli
        .target
        .clone()
        .unwrap_or_else(|| manager_config.get_config().target_language.clone());
    let mut config = manager_config.config_for(&target, cli.api_url.as_deref());
    if let Some(mode) = cli.mode {
        config.display_mode = mode;
    }
    config.validate()?;

    let token = cli.token.clone().or_else(|| AccessToken::get().ok());
    let credentials = Arc::new(StaticCredentials::new(token));
    let remote = NetworkTranslator::from_config(&config, credentials)?;
    let provider = Arc::new(ProviderTier::network_only(Arc::new(remote), (&config).into()));

    let data = read_input(&cli.input)?;
    let dom = html_to_dom(&data, &cli.encoding)?;
    let document = dom.document.clone();

    // 布局按提取顺序估算，和管理器内部的提取结果一致
    let preview = TextExtractor::default().extract(&document);
    let layout = Rc::new(EstimatedLayout::from_elements(&preview));
    let total_height = layout.total_height();

    let viewport_height = cli.viewport_height.max(1.0);
    let (viewport_tx, viewport_rx) = watch::channel(Viewport::new(0.0, viewport_height));

    let mode = config.display_mode;
    let debounce = config.debounce();
    let manager = TranslationManager::new(document.clone(), provider, layout, viewport_rx, config);
    let mut events = manager.subscribe();

    let count = manager.translate_page(&target, mode)?;
    tracing::info!("共 {} 个可翻译元素", count);

    let mut scroll_top = 0.0;
    while count > 0 && scroll_top + viewport_height < total_height && manager.is_observing() {
        tokio::time::sleep(debounce * 2).await;
        scroll_top += viewport_height;
        let _ = viewport_tx.send(Viewport::new(scroll_top, viewport_height));
    }
    drop(viewport_tx);

    manager.wait_until_settled().await;

    if cli.show_original {
        manager.toggle_view(ViewMode::Original);
    }

    let mut clean = true;
    loop {
        match events.try_recv() {
            Ok(SessionEvent::Error { code, message }) => {
                clean = false;
                eprintln!("翻译失败 [{}]: {}", code, message);
            }
            Ok(SessionEvent::LoginRequired) => {
                clean = false;
                eprintln!("翻译服务要求登录，请通过 --token 或 XPLAINO_ACCESS_TOKEN 提供凭证");
            }
            Ok(_) => {}
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }

    eprintln!(
        "{}: {}/{} 个元素已翻译",
        manager.state(),
        manager.translated_count(),
        manager.element_count()
    );

    let html = serialize_document(&document, &cli.encoding)?;
    match &cli.output {
        Some(path) => fs::write(path, html)?,
        None => io::stdout().write_all(&html)?,
    }

    Ok(clean)
}
