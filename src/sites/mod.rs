//! 平台适配层
//!
//! 浏览器抓取流程对两个平台一致，差异收敛在 [`PlatformAdapter`] 上：
//! 页面预处理、滚动目标与评论解析。

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::core::error::{HarvestError, Result};
use crate::core::event::HarvestEvent;
use crate::core::model::{CapturedComment, Platform, SessionConfig, StrategyMode};
use crate::engine::captcha::{CaptchaSentinel, CaptchaState};
use crate::engine::context::RuntimeContext;
use crate::engine::pacing::Pacing;
use crate::engine::scroll::{ChallengeWatch, ConvergenceEngine};
use crate::fingerprint::Configurator;
use crate::interfaces::{CommentStrategy, ScrollSurface};
use crate::network::browser::BrowserSession;
use crate::network::page::BrowserPage;

pub mod facebook;
pub mod tiktok;

/// 平台差异点
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// 页面正文中表示内容不存在的提示
    fn unavailable_markers(&self) -> &'static [&'static str];

    /// 打开评论区、切换排序等滚动前的准备
    async fn prepare(&self, page: &BrowserPage, pacing: &Pacing) -> Result<()>;

    fn surface<'a>(&'a self, page: &'a BrowserPage) -> Box<dyn ScrollSurface + 'a>;

    fn extract(&self, html: &str, limit: Option<usize>) -> Vec<CapturedComment>;
}

/// 浏览器抓取策略
pub struct BrowserStrategy<A: PlatformAdapter> {
    adapter: A,
    ctx: RuntimeContext,
    session: Option<SessionConfig>,
    browser: Option<BrowserSession>,
    page: Option<BrowserPage>,
    sentinel: Option<CaptchaSentinel>,
    cookies_applied: bool,
}

impl<A: PlatformAdapter> BrowserStrategy<A> {
    pub fn new(adapter: A, ctx: RuntimeContext) -> Self {
        Self {
            adapter,
            ctx,
            session: None,
            browser: None,
            page: None,
            sentinel: None,
            cookies_applied: false,
        }
    }

    fn page(&self) -> Result<&BrowserPage> {
        self.page
            .as_ref()
            .ok_or_else(|| HarvestError::Browser("browser strategy used before configure".into()))
    }

    fn sentinel(&self) -> Result<&CaptchaSentinel> {
        self.sentinel
            .as_ref()
            .ok_or_else(|| HarvestError::Browser("browser strategy used before configure".into()))
    }

    /// 处理导航后出现的验证码
    ///
    /// 已注入 Cookie 且开启宽限期时，先复查再刷新重试，仍在才交给哨兵。
    async fn settle_challenge(&self, page: &BrowserPage) -> Result<()> {
        let sentinel = self.sentinel()?;
        if sentinel.state(page).await == CaptchaState::Absent {
            return Ok(());
        }

        if self.cookies_applied && sentinel.tolerates_transients() {
            if sentinel.recheck_after_grace(page).await {
                return Ok(());
            }
            info!("验证码仍在，刷新页面重试一次");
            page.reload().await?;
            self.ctx.pacing.pause(self.ctx.pacing.page_load).await;
            self.adapter.prepare(page, &self.ctx.pacing).await?;
            if sentinel.state(page).await == CaptchaState::Absent {
                info!("刷新后验证码已消失");
                return Ok(());
            }
        }

        sentinel.guard(page).await?;
        Ok(())
    }
}

#[async_trait]
impl<A: PlatformAdapter> CommentStrategy for BrowserStrategy<A> {
    fn platform(&self) -> Platform {
        self.adapter.platform()
    }

    async fn configure(&mut self, session: &SessionConfig) -> Result<()> {
        let profile = Configurator::new(&self.ctx.config.browser).build(session)?;
        self.ctx.emit(HarvestEvent::SessionLaunched {
            user_agent: profile.user_agent.clone(),
            mobile: profile.mobile,
        });

        let browser = BrowserSession::launch(profile).await?;
        let page = browser.new_page().await;
        // 页面创建失败时也要把浏览器交给 release 关闭
        self.browser = Some(browser);
        self.page = Some(page?);

        self.sentinel = Some(
            CaptchaSentinel::new(
                self.adapter.platform(),
                session.headless,
                self.ctx.config.captcha.clone(),
            )
            .with_events(self.ctx.events.clone()),
        );
        self.session = Some(session.clone());
        Ok(())
    }

    async fn apply_cookies(&mut self) -> Result<bool> {
        let platform = self.adapter.platform();
        let Some(cookies) = self
            .session
            .as_ref()
            .and_then(|s| s.cookies.clone())
            .filter(|c| !c.is_empty())
        else {
            debug!("未提供 Cookie，以访客身份访问");
            return Ok(false);
        };

        let report = cookies.log_report(platform);
        let page = self.page()?;
        let applied = match page.warm_cookies(platform, &cookies).await {
            Ok(n) => n,
            Err(e) => {
                warn!("Cookie 注入失败: {}", e);
                return Ok(false);
            }
        };
        self.ctx.pacing.pause(self.ctx.pacing.cookie_warmup).await;

        self.ctx.emit(HarvestEvent::CookiesApplied {
            applied,
            missing: report.missing_critical,
        });
        self.cookies_applied = applied > 0;
        Ok(self.cookies_applied)
    }

    async fn scrape(&mut self, url: &str) -> Result<Vec<CapturedComment>> {
        let page = self.page()?;
        let pacing = &self.ctx.pacing;

        info!("打开页面: {}", url);
        page.goto(url).await?;
        pacing.pause(pacing.page_load).await;

        page.check_availability(self.adapter.unavailable_markers()).await?;
        self.adapter.prepare(page, pacing).await?;
        self.settle_challenge(page).await?;

        let surface = self.adapter.surface(page);
        let watch = ChallengeWatch {
            sentinel: self.sentinel()?,
            probe: page,
        };
        let report = ConvergenceEngine::new(&self.ctx.config.scroll, pacing)
            .with_events(self.ctx.events.as_ref())
            .run(surface.as_ref(), Some(&watch))
            .await?;
        debug!("滚动结束: {:?}", report);

        let html = page.html().await?;
        let comments = self.adapter.extract(&html, self.ctx.max_comments);
        info!("提取到 {} 条评论", comments.len());

        self.ctx.emit(HarvestEvent::CommentsCollected {
            total: comments.len(),
        });
        self.ctx
            .report(comments.len(), format!("extracted {} comments", comments.len()));
        Ok(comments)
    }

    async fn release(&mut self) {
        self.page.take();
        self.sentinel.take();
        if let Some(mut browser) = self.browser.take()
            && let Err(e) = browser.close().await
        {
            warn!("关闭浏览器失败: {}", e);
        }
    }
}

/// 按平台与模式构造抓取策略
///
/// 接口模式仅支持 TikTok。
pub fn build_strategy(
    platform: Platform,
    mode: StrategyMode,
    ctx: RuntimeContext,
) -> Result<Box<dyn CommentStrategy>> {
    Ok(match (platform, mode) {
        (Platform::TikTok, StrategyMode::Browser) => {
            Box::new(BrowserStrategy::new(tiktok::TikTokAdapter, ctx))
        }
        (Platform::TikTok, StrategyMode::Api) => Box::new(tiktok::api::ApiStrategy::new(ctx)),
        (Platform::Facebook, StrategyMode::Browser) => {
            Box::new(BrowserStrategy::new(facebook::FacebookAdapter, ctx))
        }
        (Platform::Facebook, StrategyMode::Api) => {
            return Err(HarvestError::Parse(
                "api mode is only available for TikTok".into(),
            ));
        }
    })
}
