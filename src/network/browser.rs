//! 浏览器会话
//!
//! 依据启动画像拉起 Chromium，并负责页面创建、反指纹脚本注入与确定性的资源释放。

use chromiumoxide::{
    Page,
    browser::{Browser, BrowserConfig},
    cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams,
    handler::viewport::Viewport,
};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::error::{HarvestError, Result, SetupFailure};
use crate::fingerprint::{LaunchProfile, ProxyAuthExtension};
use crate::network::page::BrowserPage;

/// 浏览器会话
/// 采用显式的所有权管理，确保关闭逻辑的确定性
pub struct BrowserSession {
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
    /// 认证扩展目录必须活得比浏览器久
    extension: Option<ProxyAuthExtension>,
    scripts: Vec<&'static str>,
}

impl BrowserSession {
    /// 启动浏览器会话
    ///
    /// 无法拉起浏览器属于环境错误，与抓取失败区分。
    pub async fn launch(mut profile: LaunchProfile) -> Result<Self> {
        let browser_config = build_browser_config(&profile)?;

        let (browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| {
            HarvestError::Setup(SetupFailure::BrowserUnavailable(e.to_string()))
        })?;

        // 启动事件循环
        let handle = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        info!(
            "浏览器已启动: {} {}x{} mobile={} headless={}",
            profile.platform, profile.window.0, profile.window.1, profile.mobile, profile.headless
        );

        Ok(Self {
            browser: Some(browser),
            handler: Some(handle),
            extension: profile.extension.take(),
            scripts: profile.stealth_scripts().collect(),
        })
    }

    /// 创建新页面并注入反指纹脚本
    pub async fn new_page(&self) -> Result<BrowserPage> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| HarvestError::Browser("Browser already closed".into()))?;
        let page = browser.new_page("about:blank").await?;

        inject_scripts(&page, &self.scripts).await;

        Ok(BrowserPage::new(page))
    }

    /// 优雅关闭浏览器，并等待事件循环结束
    pub async fn close(&mut self) -> Result<()> {
        let browser = self.browser.take();
        let handler = self.handler.take();

        if let Some(mut b) = browser {
            if let Err(e) = b.close().await {
                debug!("关闭浏览器时发生非致命错误: {}", e);
            }
            let _ = b.wait().await;
            if let Some(h) = handler {
                let _ = h.await;
            }
            debug!("浏览器已关闭");
        }
        self.extension.take();
        Ok(())
    }
}

async fn inject_scripts(page: &Page, scripts: &[&str]) {
    for script in scripts {
        if let Err(e) = page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(script.to_string()))
            .await
        {
            warn!("反指纹脚本注入失败: {}", e);
        }
    }
}

/// 构建浏览器配置
fn build_browser_config(profile: &LaunchProfile) -> Result<BrowserConfig> {
    let (width, height) = profile.window;
    let mut builder = BrowserConfig::builder()
        // 默认参数里带有 --enable-automation
        .disable_default_args()
        .args(profile.args.clone())
        .window_size(width, height)
        .viewport(Viewport {
            width,
            height,
            device_scale_factor: None,
            emulating_mobile: profile.mobile,
            is_landscape: false,
            has_touch: profile.mobile,
        });

    if !profile.headless {
        builder = builder.with_head();
    }

    if let Some(ext) = &profile.extension {
        builder = builder.extension(ext.path().display().to_string());
    }

    if let Some(path) = &profile.chrome_path {
        builder = builder.chrome_executable(path);
    }

    builder
        .build()
        .map_err(|e| HarvestError::Setup(SetupFailure::BrowserUnavailable(e)))
}

// 在 Drop 时尝试最后一次保护
impl Drop for BrowserSession {
    fn drop(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            let handler = self.handler.take();
            let extension = self.extension.take();
            // 在后台清理
            if let Ok(rt) = tokio::runtime::Handle::try_current() {
                rt.spawn(async move {
                    let _ = browser.close().await;
                    let _ = browser.wait().await;
                    if let Some(h) = handler {
                        let _ = h.await;
                    }
                    drop(extension);
                });
            }
        }
    }
}
