//! 终端进度渲染 (Terminal Progress)
//!
//! 基于 `indicatif` 的单行旋转指示器，消费事件通道并把抓取里程碑渲染到终端。

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use parking_lot::RwLock;
use tokio::task::JoinHandle;

use crate::core::event::{EventReceiver, HarvestEvent, LogLevel};

/// 全局 TUI 容器
static MULTI: OnceLock<MultiProgress> = OnceLock::new();

pub fn get_multi() -> &'static MultiProgress {
    MULTI.get_or_init(MultiProgress::new)
}

static BAR: OnceLock<Arc<RwLock<Option<ProgressBar>>>> = OnceLock::new();

fn bar_slot() -> &'static Arc<RwLock<Option<ProgressBar>>> {
    BAR.get_or_init(|| Arc::new(RwLock::new(None)))
}

pub struct Ui;

impl Ui {
    /// 启动事件监听循环
    pub fn run(receiver: EventReceiver) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = receiver.recv_async().await {
                Self::handle_event(event);
            }
        })
    }

    fn handle_event(event: HarvestEvent) {
        let mut slot = bar_slot().write();

        match &event {
            HarvestEvent::TaskStarted { .. } => {
                let style = ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner())
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
                let bar = get_multi().add(ProgressBar::new_spinner());
                bar.set_style(style);
                bar.enable_steady_tick(Duration::from_millis(100));
                *slot = Some(bar);
            }
            HarvestEvent::TaskCompleted { .. } => {
                if let Some(bar) = slot.take() {
                    bar.finish_with_message(describe(&event));
                }
                return;
            }
            HarvestEvent::TaskFailed { .. } => {
                if let Some(bar) = slot.take() {
                    bar.abandon_with_message(describe(&event));
                }
                return;
            }
            _ => {}
        }

        if let Some(bar) = slot.as_ref() {
            bar.set_message(describe(&event));
        }
    }
}

/// 事件对应的状态行文本
fn describe(event: &HarvestEvent) -> String {
    match event {
        HarvestEvent::TaskStarted { platform, url } => {
            format!("[{}] {}", platform, truncate_string(url, 60))
        }
        HarvestEvent::SessionLaunched { mobile, .. } => {
            format!("browser ready ({})", if *mobile { "mobile" } else { "desktop" })
        }
        HarvestEvent::CookiesApplied { applied, missing } if missing.is_empty() => {
            format!("{} cookies applied", applied)
        }
        HarvestEvent::CookiesApplied { applied, missing } => {
            format!("{} cookies applied, missing {}", applied, missing.join(", "))
        }
        HarvestEvent::CaptchaDetected { headless: true } => "⚠️ captcha detected".to_string(),
        HarvestEvent::CaptchaDetected { headless: false } => {
            "⚠️ captcha detected, solve it in the browser window".to_string()
        }
        HarvestEvent::CaptchaCleared => "captcha cleared, resuming".to_string(),
        HarvestEvent::ScrollBurst { burst, .. } => format!("scrolling (burst {})", burst),
        HarvestEvent::Converged { bursts } => format!("scroll converged after {} bursts", bursts),
        HarvestEvent::PageFetched { page, total } => {
            format!("page {} fetched, {} comments", page, total)
        }
        HarvestEvent::CommentsCollected { total } => format!("{} comments", total),
        HarvestEvent::TaskCompleted { total } => format!("✅ {} comments collected", total),
        HarvestEvent::TaskFailed { error } => format!("❌ FAILED: {}", error),
        HarvestEvent::Log { level, message } => match level {
            LogLevel::Warn => format!("⚠️ {}", message),
            LogLevel::Info => message.clone(),
        },
    }
}

fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}
