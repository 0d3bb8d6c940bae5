//! 交互式 Cookie 采集器 (Interactive Cookie Grabber)
//!
//! 打开可见的浏览器窗口供人工登录与处理验证码，随后导出整个 Cookie 罐。
//! 生命周期不绑定单次抓取，必须显式关闭。

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::core::config::AppConfig;
use crate::core::error::{HarvestError, Result};
use crate::core::model::{Platform, SessionConfig};
use crate::fingerprint::Configurator;
use crate::interfaces::ChallengeProbe;
use crate::network::browser::BrowserSession;
use crate::network::cookies::{CookieEnvelope, CookieSet};
use crate::network::page::BrowserPage;

const WINDOW: (u32, u32) = (500, 800);
const HOME_SETTLE: Duration = Duration::from_secs(2);
const TARGET_SETTLE: Duration = Duration::from_secs(3);
const CHALLENGE_POLL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GrabberStatus {
    Idle,
    Waiting,
    Ready,
    Closed,
    Error,
}

/// 登录态轮询结果
#[derive(Debug, Clone, Serialize)]
pub struct LoginStatus {
    pub logged_in: bool,
    pub has_session: bool,
    pub cookie_count: usize,
    pub current_url: String,
}

/// 导出结果
#[derive(Debug, Clone, Serialize)]
pub struct HarvestedCookies {
    pub envelope: CookieEnvelope,
    pub found: Vec<String>,
    pub missing: Vec<String>,
}

pub struct CookieGrabber {
    platform: Platform,
    config: Arc<AppConfig>,
    browser: Option<BrowserSession>,
    page: Option<BrowserPage>,
    status: GrabberStatus,
}

impl CookieGrabber {
    pub fn new(platform: Platform, config: Arc<AppConfig>) -> Self {
        Self {
            platform,
            config,
            browser: None,
            page: None,
            status: GrabberStatus::Idle,
        }
    }

    pub fn status(&self) -> GrabberStatus {
        self.status
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// 打开登录页；已有会话时先关闭再重开
    pub async fn start(&mut self) -> Result<()> {
        if self.browser.is_some() {
            self.close().await;
        }

        match self.launch().await {
            Ok(()) => {
                self.status = GrabberStatus::Waiting;
                info!("浏览器已打开，请在窗口中登录 {} 并处理验证码", self.platform);
                Ok(())
            }
            Err(e) => {
                warn!("打开浏览器失败: {}", e);
                self.status = GrabberStatus::Error;
                self.close_resources().await;
                Err(e)
            }
        }
    }

    async fn launch(&mut self) -> Result<()> {
        let session = SessionConfig {
            headless: false,
            proxy: None,
            platform: self.platform,
            cookies: None,
        };
        let profile = Configurator::new(&self.config.browser).build_interactive(&session, WINDOW)?;
        let browser = BrowserSession::launch(profile).await?;
        let page = browser.new_page().await;
        self.browser = Some(browser);
        let page = page?;
        page.goto(self.platform.login_url()).await?;
        self.page = Some(page);
        Ok(())
    }

    fn page(&self) -> Result<&BrowserPage> {
        self.page
            .as_ref()
            .ok_or_else(|| HarvestError::Browser("grabber browser is not open".into()))
    }

    /// 主会话 Cookie 存在且已离开登录页即视为登录成功
    pub async fn login_status(&mut self) -> Result<LoginStatus> {
        let page = self.page()?;
        let current_url = page.url().await?;
        let cookies = page.cookies().await?;
        let status = evaluate_login(self.platform, &cookies, current_url);
        if status.logged_in && self.status != GrabberStatus::Ready {
            info!("检测到 {} 已登录", self.platform);
            self.status = GrabberStatus::Ready;
        }
        Ok(status)
    }

    /// 导出 Cookie 罐及重要 Cookie 检出报告
    pub async fn harvest(&mut self) -> Result<HarvestedCookies> {
        let platform = self.platform;
        let page = self.page()?;

        let domain = platform.cookie_domain().trim_start_matches('.');
        if !page.url().await.unwrap_or_default().contains(domain) {
            page.goto(platform.home_url()).await?;
            tokio::time::sleep(HOME_SETTLE).await;
        }

        let cookies = page.cookies().await?;
        if cookies.is_empty() {
            return Err(HarvestError::MissingCredentials(
                "no cookies found in the grabber browser".into(),
            ));
        }

        let report = cookies.log_report(platform);
        info!("已导出 {} 条 Cookie", cookies.len());
        Ok(HarvestedCookies {
            envelope: cookies.into_envelope(platform.home_url().trim_end_matches('/')),
            found: report.found,
            missing: report.missing,
        })
    }

    /// 打开目标内容页预热 Cookie，返回是否出现验证码
    pub async fn navigate_to_target(&mut self, url: &str) -> Result<bool> {
        let page = self.page()?;
        page.goto(url).await?;
        tokio::time::sleep(TARGET_SETTLE).await;

        let challenged = page.challenge_visible().await.unwrap_or(false);
        if challenged {
            info!("目标页出现验证码，请在窗口中处理");
        }
        Ok(challenged)
    }

    /// 等待一个轮询间隔后复查当前页面的验证码，不重新加载页面
    pub async fn challenge_pending(&self) -> Result<bool> {
        tokio::time::sleep(CHALLENGE_POLL).await;
        let page = self.page()?;
        Ok(page.challenge_visible().await.unwrap_or(false))
    }

    /// 释放全部资源
    pub async fn close(&mut self) {
        self.close_resources().await;
        self.status = GrabberStatus::Closed;
    }

    async fn close_resources(&mut self) {
        self.page.take();
        if let Some(mut browser) = self.browser.take()
            && let Err(e) = browser.close().await
        {
            warn!("关闭采集浏览器失败: {}", e);
        }
    }
}

fn evaluate_login(platform: Platform, cookies: &CookieSet, current_url: String) -> LoginStatus {
    let has_session = cookies.contains(platform.session_cookie());
    LoginStatus {
        logged_in: has_session && !current_url.contains("/login"),
        has_session,
        cookie_count: cookies.len(),
        current_url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jar(json: &str, platform: Platform) -> CookieSet {
        CookieSet::from_json(json, platform.cookie_domain()).unwrap()
    }

    #[test]
    fn login_needs_session_cookie_and_leaving_login_page() {
        let tiktok = jar(r#"{"sessionid":"s","msToken":"m"}"#, Platform::TikTok);
        let s = evaluate_login(Platform::TikTok, &tiktok, "https://www.tiktok.com/foryou".into());
        assert!(s.logged_in);
        assert_eq!(s.cookie_count, 2);

        let s = evaluate_login(Platform::TikTok, &tiktok, "https://www.tiktok.com/login".into());
        assert!(s.has_session && !s.logged_in);

        let guest = jar(r#"{"ttwid":"t"}"#, Platform::TikTok);
        assert!(!evaluate_login(Platform::TikTok, &guest, "https://www.tiktok.com/".into()).logged_in);

        let fb = jar(r#"{"c_user":"1","xs":"x"}"#, Platform::Facebook);
        assert!(evaluate_login(Platform::Facebook, &fb, "https://www.facebook.com/".into()).logged_in);
    }

    #[tokio::test]
    async fn operations_before_start_fail_cleanly() {
        let mut g = CookieGrabber::new(Platform::Facebook, Arc::new(AppConfig::default()));
        assert_eq!(g.status(), GrabberStatus::Idle);
        assert!(g.login_status().await.is_err());
        assert!(g.harvest().await.is_err());

        g.close().await;
        assert_eq!(g.status(), GrabberStatus::Closed);
        assert_eq!(g.status().to_string(), "closed");
    }

    #[tokio::test(start_paused = true)]
    async fn challenge_poll_waits_then_needs_an_open_page() {
        let g = CookieGrabber::new(Platform::TikTok, Arc::new(AppConfig::default()));
        let start = tokio::time::Instant::now();
        assert!(g.challenge_pending().await.is_err());
        assert_eq!(start.elapsed(), CHALLENGE_POLL);
    }
}
