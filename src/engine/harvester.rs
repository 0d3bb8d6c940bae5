//! 抓取门面 (Harvester Facade)
//!
//! 一次 `scrape` 调用的完整生命周期：选平台 → 规范化 Cookie 与代理 →
//! 构造策略 → `configure → apply_cookies → scrape`，无论结局如何最后都会 `release`。

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::config::AppConfig;
use crate::core::error::Result;
use crate::core::event::{EventSender, HarvestEvent};
use crate::core::model::{CapturedComment, Platform, SessionConfig, StrategyMode};
use crate::core::progress::ProgressHandle;
use crate::engine::context::RuntimeContext;
use crate::engine::pacing::Pacing;
use crate::interfaces::CommentStrategy;
use crate::network::cookies::{CookiePayload, CookieSet};
use crate::network::proxy::ProxySpec;
use crate::sites::build_strategy;

/// 单次抓取请求
#[derive(Debug, Clone, bon::Builder)]
pub struct ScrapeRequest {
    #[builder(into)]
    pub url: String,
    pub cookies: Option<CookiePayload>,
    pub proxy: Option<String>,
    /// 缺省取配置文件中的值
    pub headless: Option<bool>,
    #[builder(default)]
    pub mode: StrategyMode,
    pub max_comments: Option<usize>,
}

pub struct Harvester {
    config: Arc<AppConfig>,
    events: Option<EventSender>,
    progress: Option<ProgressHandle>,
    pacing: Option<Pacing>,
}

impl Harvester {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self {
            config,
            events: None,
            progress: None,
            pacing: None,
        }
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_progress(mut self, progress: ProgressHandle) -> Self {
        self.progress = Some(progress);
        self
    }

    /// 覆盖配置中的节奏策略
    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = Some(pacing);
        self
    }

    /// 抓取一个帖子或视频的一级评论
    ///
    /// 结果要么是去重后的评论列表，要么是单个类型化错误。
    pub async fn scrape(&self, req: ScrapeRequest) -> Result<Vec<CapturedComment>> {
        let outcome = self.run(&req).await;

        match &outcome {
            Ok(comments) => {
                info!("抓取完成，共 {} 条评论", comments.len());
                self.emit(HarvestEvent::TaskCompleted {
                    total: comments.len(),
                });
                if let Some(p) = &self.progress {
                    p.finish(comments.len(), "done");
                }
            }
            Err(e) => {
                warn!("抓取失败 ({}): {}", e.kind(), e);
                self.emit(HarvestEvent::TaskFailed {
                    error: e.to_string(),
                });
                if let Some(p) = &self.progress {
                    p.finish(0, e.to_string());
                }
            }
        }
        outcome
    }

    async fn run(&self, req: &ScrapeRequest) -> Result<Vec<CapturedComment>> {
        let platform = Platform::from_url(&req.url)?;
        info!("开始抓取 [{}] {}", platform, req.url);
        self.emit(HarvestEvent::TaskStarted {
            platform,
            url: req.url.clone(),
        });

        let session = self.session_for(platform, req)?;
        let strategy = build_strategy(platform, req.mode, self.context(req.max_comments))?;
        drive(strategy, &session, &req.url).await
    }

    /// 构造不可变的会话配置
    ///
    /// 无法识别的 Cookie 载荷只告警，按无 Cookie 继续。
    pub fn session_for(&self, platform: Platform, req: &ScrapeRequest) -> Result<SessionConfig> {
        let cookies = req
            .cookies
            .as_ref()
            .and_then(|payload| CookieSet::normalize(payload, platform.cookie_domain()));
        if req.cookies.is_some() && cookies.is_none() {
            warn!("无法识别的 Cookie 格式，按无 Cookie 继续");
        }

        let proxy = req
            .proxy
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(ProxySpec::parse)
            .transpose()?;
        if let Some(p) = &proxy {
            debug!("使用代理 {}", p.server());
        }

        Ok(SessionConfig {
            headless: req.headless.unwrap_or(self.config.browser.headless),
            proxy,
            platform,
            cookies,
        })
    }

    fn context(&self, max_comments: Option<usize>) -> RuntimeContext {
        let ctx = RuntimeContext::new(self.config.clone())
            .with_events(self.events.clone())
            .with_progress(self.progress.clone())
            .with_max_comments(max_comments);
        match &self.pacing {
            Some(p) => ctx.with_pacing(p.clone()),
            None => ctx,
        }
    }

    fn emit(&self, event: HarvestEvent) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }
}

/// 按固定顺序驱动策略，任何出口都释放资源
pub async fn drive(
    mut strategy: Box<dyn CommentStrategy>,
    session: &SessionConfig,
    url: &str,
) -> Result<Vec<CapturedComment>> {
    let outcome = run_stages(strategy.as_mut(), session, url).await;
    strategy.release().await;
    debug!("{} 策略资源已释放", strategy.platform());
    outcome
}

async fn run_stages(
    strategy: &mut dyn CommentStrategy,
    session: &SessionConfig,
    url: &str,
) -> Result<Vec<CapturedComment>> {
    strategy.configure(session).await?;
    if !strategy.apply_cookies().await? {
        debug!("未注入 Cookie");
    }
    strategy.scrape(url).await
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::core::error::{HarvestError, SetupFailure};
    use crate::core::event::create_event_channel;
    use crate::core::progress::{ProgressBoard, ProgressStatus};

    #[derive(Clone, Copy, PartialEq)]
    enum FailAt {
        Nowhere,
        Configure,
        Scrape,
    }

    struct ScriptedStrategy {
        fail_at: FailAt,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl CommentStrategy for ScriptedStrategy {
        fn platform(&self) -> Platform {
            Platform::TikTok
        }

        async fn configure(&mut self, _session: &SessionConfig) -> Result<()> {
            self.calls.lock().push("configure");
            if self.fail_at == FailAt::Configure {
                return Err(HarvestError::Setup(SetupFailure::BrowserUnavailable("none".into())));
            }
            Ok(())
        }

        async fn apply_cookies(&mut self) -> Result<bool> {
            self.calls.lock().push("apply_cookies");
            Ok(true)
        }

        async fn scrape(&mut self, _url: &str) -> Result<Vec<CapturedComment>> {
            self.calls.lock().push("scrape");
            if self.fail_at == FailAt::Scrape {
                return Err(HarvestError::BotDetected("blocked".into()));
            }
            Ok(vec![CapturedComment::new(Platform::TikTok, "@a", "hi", None, 1)])
        }

        async fn release(&mut self) {
            self.calls.lock().push("release");
        }
    }

    fn scripted(fail_at: FailAt) -> (Box<dyn CommentStrategy>, Arc<Mutex<Vec<&'static str>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let s = ScriptedStrategy {
            fail_at,
            calls: calls.clone(),
        };
        (Box::new(s), calls)
    }

    fn session() -> SessionConfig {
        SessionConfig {
            headless: true,
            proxy: None,
            platform: Platform::TikTok,
            cookies: None,
        }
    }

    #[tokio::test]
    async fn release_runs_on_every_exit_path() {
        let (s, calls) = scripted(FailAt::Nowhere);
        assert_eq!(drive(s, &session(), "u").await.unwrap().len(), 1);
        assert_eq!(
            *calls.lock(),
            vec!["configure", "apply_cookies", "scrape", "release"]
        );

        let (s, calls) = scripted(FailAt::Scrape);
        let err = drive(s, &session(), "u").await.unwrap_err();
        assert!(matches!(err, HarvestError::BotDetected(_)));
        assert_eq!(calls.lock().last(), Some(&"release"));

        let (s, calls) = scripted(FailAt::Configure);
        let err = drive(s, &session(), "u").await.unwrap_err();
        assert!(err.is_setup());
        assert_eq!(*calls.lock(), vec!["configure", "release"]);
    }

    #[test]
    fn session_normalizes_cookies_and_proxy() {
        let harvester = Harvester::new(Arc::new(AppConfig::default()));
        let payload = CookiePayload::from_json(r#"[{"name":"c_user","value":"1"}]"#).unwrap();
        let req = ScrapeRequest::builder()
            .url("https://www.facebook.com/post/1")
            .cookies(payload)
            .proxy("socks5://u:p@1.2.3.4:1080".to_string())
            .headless(false)
            .build();

        let session = harvester.session_for(Platform::Facebook, &req).unwrap();
        assert!(!session.headless);
        assert!(session.proxy.as_ref().unwrap().has_credentials());
        let cookies = session.cookies.unwrap();
        assert_eq!(cookies.get("c_user"), Some("1"));
        assert_eq!(cookies.iter().next().unwrap().domain, ".facebook.com");
    }

    #[test]
    fn bad_proxy_is_rejected_before_launch() {
        let harvester = Harvester::new(Arc::new(AppConfig::default()));
        let req = ScrapeRequest::builder()
            .url("https://www.tiktok.com/@a/video/1")
            .proxy("ftp://nope".to_string())
            .build();
        assert!(harvester.session_for(Platform::TikTok, &req).is_err());
    }

    #[tokio::test]
    async fn unsupported_url_fails_with_events_and_progress() {
        let (tx, rx) = create_event_channel();
        let board = ProgressBoard::new();
        let harvester = Harvester::new(Arc::new(AppConfig::default()))
            .with_events(tx)
            .with_progress(board.handle("caller-1"));

        let req = ScrapeRequest::builder().url("https://example.com/x").build();
        assert!(harvester.scrape(req).await.is_err());

        assert_eq!(board.get("caller-1").unwrap().status, ProgressStatus::Done);
        assert!(matches!(rx.try_recv(), Some(HarvestEvent::TaskFailed { .. })));
    }

    #[tokio::test]
    async fn api_mode_without_cookies_is_a_configuration_failure() {
        let (tx, rx) = create_event_channel();
        let harvester = Harvester::new(Arc::new(AppConfig::default()))
            .with_events(tx)
            .with_pacing(Pacing::instant());
        let req = ScrapeRequest::builder()
            .url("https://www.tiktok.com/@a/video/7300000000000000001")
            .mode(StrategyMode::Api)
            .build();

        let err = harvester.scrape(req).await.unwrap_err();
        assert_eq!(err.kind().to_string(), "Configuration");
        assert!(matches!(rx.try_recv(), Some(HarvestEvent::TaskStarted { .. })));
        assert!(matches!(rx.try_recv(), Some(HarvestEvent::TaskFailed { .. })));
    }
}
