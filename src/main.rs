//! 应用程序入口 (Application Entrypoint)
//!
//! 负责 CLI 指令解析、遥测层初始化以及抓取/采集两类任务的生命周期管理。

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::fmt::MakeWriter;

use comment_harvester::actors::proxy::{ProxyMsg, ProxyRotator, next_proxy};
use comment_harvester::core::config::AppConfig;
use comment_harvester::core::event::create_event_channel;
use comment_harvester::core::progress::ProgressBoard;
use comment_harvester::network::cookies::CookiePayload;
use comment_harvester::network::grabber::CookieGrabber;
use comment_harvester::ui::{Ui, get_multi};
use comment_harvester::{FailureKind, Harvester, Platform, ScrapeRequest, StrategyMode};

/// 进度条感知的日志写入器
///
/// 确保日志输出不会破坏终端进度条的渲染布局。
struct IndicatifWriter;

impl io::Write for IndicatifWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let _ = get_multi().println(s.trim_end());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for IndicatifWriter {
    type Writer = IndicatifWriter;

    fn make_writer(&self) -> Self::Writer {
        IndicatifWriter
    }
}

#[derive(Parser)]
#[command(name = "harvester", author, version, about, long_about = None)]
struct Cli {
    /// 配置文件路径
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 抓取一个视频或帖子的评论
    Scrape {
        /// TikTok 视频或 Facebook 帖子地址
        url: String,
        /// Cookie 文件 (JSON)
        #[arg(long)]
        cookies: Option<PathBuf>,
        /// 代理，缺省时从代理池中取
        #[arg(long)]
        proxy: Option<String>,
        /// 显示浏览器窗口，出现验证码时等待人工处理
        #[arg(long)]
        headed: bool,
        /// 直连 TikTok 评论接口
        #[arg(long)]
        api: bool,
        #[arg(long)]
        max_comments: Option<usize>,
        /// 结果输出文件，缺省打印到标准输出
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// 打开可见浏览器登录并导出 Cookie
    Grab {
        #[arg(long, default_value = "tiktok")]
        platform: Platform,
        /// 登录后预热的内容页
        #[arg(long)]
        target: Option<String>,
        #[arg(long, default_value = "cookies.json")]
        output: PathBuf,
        /// 等待登录的最长秒数
        #[arg(long, default_value_t = 300)]
        wait_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "info");
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(IndicatifWriter)
        .with_target(false)
        .with_ansi(true)
        .init();

    let cli = Cli::parse();
    let config = Arc::new(AppConfig::load_from(&cli.config)?);

    match cli.command {
        Commands::Scrape {
            url,
            cookies,
            proxy,
            headed,
            api,
            max_comments,
            output,
        } => {
            let cookies = match cookies {
                Some(path) => {
                    let text = tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("reading cookies from {}", path.display()))?;
                    CookiePayload::from_json(&text)
                }
                None => None,
            };

            let pool = if proxy.is_none() && !config.proxy.list.is_empty() {
                Some(ProxyRotator::start(config.clone()).await.0)
            } else {
                None
            };
            let proxy = match (proxy, &pool) {
                (Some(p), _) => Some(p),
                (None, Some(tx)) => next_proxy(tx).await,
                (None, None) => None,
            };

            let request = ScrapeRequest::builder()
                .url(url)
                .maybe_cookies(cookies)
                .maybe_proxy(proxy.clone())
                .maybe_headless(headed.then_some(false))
                .mode(if api { StrategyMode::Api } else { StrategyMode::Browser })
                .maybe_max_comments(max_comments)
                .build();

            let (event_sender, event_receiver) = create_event_channel();
            let ui_handle = Ui::run(event_receiver);

            // 限定作用域，事件发送端随 Harvester 一起释放，UI 循环才能结束
            let outcome = {
                let board = ProgressBoard::new();
                let harvester = Harvester::new(config.clone())
                    .with_events(event_sender.clone())
                    .with_progress(board.handle("cli").with_events(event_sender));
                harvester.scrape(request).await
            };
            let _ = ui_handle.await;

            let comments = match outcome {
                Ok(c) => c,
                Err(e) => {
                    if e.kind() == FailureKind::BotDetected
                        && let (Some(tx), Some(p)) = (&pool, proxy)
                    {
                        let _ = tx.send_async(ProxyMsg::ReportFailure { proxy: p }).await;
                    }
                    return Err(anyhow::Error::new(e).context("scrape failed"));
                }
            };

            let json = serde_json::to_string_pretty(&comments)?;
            write_output(output.as_deref(), &json).await?;
            info!("共输出 {} 条评论", comments.len());
        }
        Commands::Grab {
            platform,
            target,
            output,
            wait_secs,
        } => {
            let mut grabber = CookieGrabber::new(platform, config.clone());
            let outcome = grab(&mut grabber, target.as_deref(), &output, wait_secs).await;
            grabber.close().await;
            outcome?;
        }
    }

    Ok(())
}

async fn grab(
    grabber: &mut CookieGrabber,
    target: Option<&str>,
    output: &Path,
    wait_secs: u64,
) -> anyhow::Result<()> {
    grabber.start().await?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(wait_secs);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("已取消");
                return Ok(());
            }
            _ = tokio::time::sleep(Duration::from_secs(3)) => {}
        }
        let status = grabber.login_status().await?;
        if status.logged_in {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("not logged in after {}s", wait_secs);
        }
    }

    if let Some(url) = target
        && grabber.navigate_to_target(url).await?
    {
        info!("请在窗口中完成验证码，完成后将自动导出");
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    warn!("已取消");
                    return Ok(());
                }
                pending = grabber.challenge_pending() => {
                    if !pending? {
                        break;
                    }
                }
            }
            if tokio::time::Instant::now() >= deadline {
                anyhow::bail!("captcha on target page was not solved in time");
            }
        }
    }

    let harvested = grabber.harvest().await?;
    if !harvested.missing.is_empty() {
        warn!("缺失 Cookie: {}", harvested.missing.join(", "));
    }
    let json = serde_json::to_string_pretty(&harvested.envelope)?;
    write_output(Some(output), &json).await?;
    info!("Cookie 已写入 {}", output.display());
    Ok(())
}

async fn write_output(path: Option<&Path>, json: &str) -> anyhow::Result<()> {
    match path {
        Some(path) => tokio::fs::write(path, json)
            .await
            .with_context(|| format!("writing {}", path.display())),
        None => {
            println!("{}", json);
            Ok(())
        }
    }
}
