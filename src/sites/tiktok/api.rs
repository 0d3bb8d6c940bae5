//! TikTok 直连评论接口 (Direct API Client)
//!
//! 携带会话 Cookie 翻页拉取 `/api/comment/list/`，完全绕过页面渲染。

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use tracing::{debug, info, warn};
use url::Url;

use crate::core::error::{CaptchaCause, HarvestError, Result};
use crate::core::event::HarvestEvent;
use crate::core::model::{CapturedComment, Platform, SessionConfig};
use crate::engine::context::RuntimeContext;
use crate::extract::CommentBook;
use crate::fingerprint::agents;
use crate::interfaces::{ApiTransport, CommentStrategy};
use crate::network::cookies::CookieSet;
use crate::network::service::{HttpOptions, HttpService};

pub const COMMENT_API: &str = "https://www.tiktok.com/api/comment/list/";

/// 单页上限
pub const MAX_PAGE_SIZE: u32 = 50;

const STATUS_NOT_FOUND: i64 = 10201;
const STATUS_COMMENTS_DISABLED: i64 = 10204;

static VIDEO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(?:video|v)/(\d+)").expect("valid regex"));

/// 接口所需的会话凭据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub session_id: Option<String>,
    pub ms_token: Option<String>,
    pub csrf_token: Option<String>,
}

impl TokenSet {
    /// 至少需要 `sessionid` 或 `msToken` 之一
    pub fn from_cookies(cookies: &CookieSet) -> Result<Self> {
        let pick = |name: &str| cookies.get(name).filter(|v| !v.is_empty()).map(String::from);
        let tokens = Self {
            session_id: pick("sessionid"),
            ms_token: pick("msToken"),
            csrf_token: pick("tt_csrf_token"),
        };
        if tokens.session_id.is_none() && tokens.ms_token.is_none() {
            return Err(HarvestError::MissingCredentials(
                "neither sessionid nor msToken present in cookies".into(),
            ));
        }
        Ok(tokens)
    }
}

/// 从 URL 路径中取视频编号
pub fn video_id(url: &str) -> Option<String> {
    VIDEO_ID.captures(url).map(|c| c[1].to_string())
}

fn is_short_link(url: &str) -> bool {
    url.contains("vm.tiktok.com") || url.contains("vt.tiktok.com")
}

#[derive(Debug, Deserialize)]
struct CommentPage {
    #[serde(default)]
    status_code: i64,
    #[serde(default)]
    status_msg: Option<String>,
    #[serde(default)]
    comments: Option<Vec<ApiComment>>,
    #[serde(default, deserialize_with = "flexible_flag")]
    has_more: bool,
    #[serde(default)]
    cursor: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ApiComment {
    #[serde(default)]
    text: String,
    #[serde(default)]
    digg_count: u64,
    #[serde(default)]
    create_time: Option<i64>,
    #[serde(default)]
    user: ApiUser,
}

#[derive(Debug, Default, Deserialize)]
struct ApiUser {
    #[serde(default)]
    unique_id: Option<String>,
    #[serde(default)]
    nickname: Option<String>,
}

/// `has_more` 可能是布尔或 0/1
fn flexible_flag<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<bool, D::Error> {
    Ok(match serde_json::Value::deserialize(d)? {
        serde_json::Value::Bool(b) => b,
        serde_json::Value::Number(n) => n.as_i64().is_some_and(|v| v != 0),
        serde_json::Value::String(s) => matches!(s.as_str(), "1" | "true"),
        _ => false,
    })
}

impl ApiComment {
    fn into_captured(self) -> CapturedComment {
        let handle = [self.user.unique_id, self.user.nickname]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty())
            .map(|s| format!("@{}", s))
            .unwrap_or_default();
        let timestamp = self.create_time.filter(|&t| t > 0).map(|t| t.to_string());
        CapturedComment::new(Platform::TikTok, handle, self.text, timestamp, self.digg_count)
    }
}

/// 翻页客户端
pub struct ApiClient {
    transport: Arc<dyn ApiTransport>,
    tokens: TokenSet,
    device_id: String,
    region: String,
    page_size: u32,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn ApiTransport>,
        cookies: &CookieSet,
        region: impl Into<String>,
        page_size: u32,
    ) -> Result<Self> {
        let tokens = TokenSet::from_cookies(cookies)?;
        let device_id = cookies
            .get("tt_chain_token")
            .filter(|v| !v.is_empty())
            .map(String::from)
            .unwrap_or_else(random_device_id);
        Ok(Self {
            transport,
            tokens,
            device_id,
            region: region.into(),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        })
    }

    /// 解析视频编号，短链先跟随跳转
    pub async fn resolve_video_id(&self, url: &str) -> Result<String> {
        if let Some(id) = video_id(url) {
            return Ok(id);
        }
        if is_short_link(url) {
            let target = self.transport.resolve(url).await?;
            debug!("短链 {} 跳转至 {}", url, target);
            if let Some(id) = video_id(&target) {
                return Ok(id);
            }
        }
        Err(HarvestError::Parse(format!("no video id in url: {}", url)))
    }

    /// 构造单页请求地址
    pub fn page_url(&self, video_id: &str, cursor: u64) -> Result<Url> {
        let page_size = self.page_size.to_string();
        let cursor = cursor.to_string();
        let mut params: Vec<(&str, &str)> = vec![
            ("aweme_id", video_id),
            ("count", page_size.as_str()),
            ("cursor", cursor.as_str()),
            ("aid", "1988"),
            ("app_language", "en"),
            ("app_name", "tiktok_web"),
            ("browser_language", "en-US"),
            ("browser_name", "Mozilla"),
            ("browser_online", "true"),
            ("browser_platform", "MacIntel"),
            ("browser_version", "5.0 (Macintosh)"),
            ("channel", "tiktok_web"),
            ("cookie_enabled", "true"),
            ("current_region", self.region.as_str()),
            ("device_id", self.device_id.as_str()),
            ("device_platform", "web_pc"),
            ("enter_from", "tiktok_web"),
            ("focus_state", "true"),
            ("from_page", "video"),
            ("history_len", "3"),
            ("is_fullscreen", "false"),
            ("is_page_visible", "true"),
            ("os", "mac"),
            ("priority_region", ""),
            ("referer", ""),
            ("region", self.region.as_str()),
            ("screen_height", "1080"),
            ("screen_width", "1920"),
            ("webcast_language", "en"),
        ];
        if let Some(token) = &self.tokens.ms_token {
            params.push(("msToken", token.as_str()));
        }
        let query = serde_urlencoded::to_string(&params)
            .map_err(|e| HarvestError::Parse(format!("comment api query: {}", e)))?;
        Url::parse(&format!("{}?{}", COMMENT_API, query))
            .map_err(|e| HarvestError::Parse(format!("comment api url: {}", e)))
    }

    /// 翻页直至耗尽或达到上限
    pub async fn collect(
        &self,
        video_id: &str,
        max_comments: usize,
        ctx: &RuntimeContext,
    ) -> Result<Vec<CapturedComment>> {
        let mut book = CommentBook::with_limit(Some(max_comments));
        let mut cursor = 0u64;
        let mut page_no = 0u32;

        while !book.is_full() {
            let url = self.page_url(video_id, cursor)?;
            debug!("请求评论页 cursor={} 已有 {}", cursor, book.len());
            let reply = self.transport.get(&url).await?;
            page_no += 1;

            let body = reply.body.trim();
            if body.len() < 10 || body.starts_with('<') {
                warn!("评论接口返回了非 JSON 内容 (长度 {})，可能是验证页", body.len());
                if book.is_empty() {
                    return Err(HarvestError::BotDetected(
                        "comment api answered with an html or empty body".into(),
                    ));
                }
                break;
            }
            if !(200..300).contains(&reply.status) {
                warn!("评论接口返回 HTTP {}", reply.status);
                if book.is_empty() {
                    return Err(HarvestError::Scraper(format!(
                        "comment api returned HTTP {}",
                        reply.status
                    )));
                }
                break;
            }

            let page: CommentPage = serde_json::from_str(body)?;
            check_status(&page)?;

            let comments = page.comments.unwrap_or_default();
            if comments.is_empty() {
                info!("评论已全部拉取");
                break;
            }

            let added = book.extend(comments.into_iter().map(ApiComment::into_captured));
            info!("第 {} 页新增 {} 条 (累计 {})", page_no, added, book.len());
            ctx.emit(HarvestEvent::PageFetched {
                page: page_no,
                total: book.len(),
            });
            ctx.report(book.len(), format!("collected {} comments", book.len()));

            if !page.has_more {
                info!("评论已全部拉取");
                break;
            }
            if added == 0 {
                warn!("第 {} 页全部是重复评论，停止翻页", page_no);
                ctx.warn(format!("api page {} repeated earlier comments, stopping", page_no));
                break;
            }
            let next = page.cursor.unwrap_or(cursor + u64::from(self.page_size));
            if next <= cursor {
                warn!("接口游标未前进 ({} -> {})，停止翻页", cursor, next);
                ctx.warn(format!("api cursor stalled at {}, stopping", cursor));
                break;
            }
            cursor = next;
            ctx.pacing.pause(ctx.pacing.api_page).await;
        }

        Ok(book.into_vec())
    }
}

fn check_status(page: &CommentPage) -> Result<()> {
    if page.status_code == 0 {
        return Ok(());
    }
    let msg = page.status_msg.clone().unwrap_or_default();
    warn!("评论接口状态码 {}: {}", page.status_code, msg);

    let lower = msg.to_lowercase();
    if lower.contains("captcha") || lower.contains("verify") {
        return Err(HarvestError::CaptchaDetected(CaptchaCause::ApiVerification(msg)));
    }
    Err(match page.status_code {
        STATUS_NOT_FOUND => HarvestError::ContentNotFound(format!("video not found: {}", msg)),
        STATUS_COMMENTS_DISABLED => {
            HarvestError::CommentsDisabled(format!("comments are disabled: {}", msg))
        }
        code => HarvestError::Scraper(format!("comment api status {}: {}", code, msg)),
    })
}

fn random_device_id() -> String {
    rand::rng()
        .random_range(1_000_000_000_000_000_000u64..=9_999_999_999_999_999_999u64)
        .to_string()
}

/// 接口抓取策略
pub struct ApiStrategy {
    ctx: RuntimeContext,
    session: Option<SessionConfig>,
    transport: Option<Arc<dyn ApiTransport>>,
    client: Option<ApiClient>,
}

impl ApiStrategy {
    pub fn new(ctx: RuntimeContext) -> Self {
        Self {
            ctx,
            session: None,
            transport: None,
            client: None,
        }
    }

    /// 替换传输层
    pub fn with_transport(mut self, transport: Arc<dyn ApiTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    fn cookies(&self) -> Option<&CookieSet> {
        self.session
            .as_ref()
            .and_then(|s| s.cookies.as_ref())
            .filter(|c| !c.is_empty())
    }
}

#[async_trait]
impl CommentStrategy for ApiStrategy {
    fn platform(&self) -> Platform {
        Platform::TikTok
    }

    async fn configure(&mut self, session: &SessionConfig) -> Result<()> {
        if !session.has_cookies() {
            return Err(HarvestError::MissingCredentials(
                "api mode requires TikTok cookies".into(),
            ));
        }
        self.session = Some(session.clone());

        if self.transport.is_none() {
            let opts = HttpOptions::builder()
                .user_agent(agents::desktop().to_string())
                .referer(Platform::TikTok.home_url().to_string())
                .maybe_proxy(session.proxy.clone())
                .maybe_cookies(session.cookies.clone())
                .timeout_secs(self.ctx.config.api.timeout_secs)
                .build();
            self.transport = Some(Arc::new(HttpService::new(&opts)?));
        }
        Ok(())
    }

    async fn apply_cookies(&mut self) -> Result<bool> {
        let Some(cookies) = self.cookies().cloned() else {
            return Ok(false);
        };
        let report = cookies.log_report(Platform::TikTok);
        self.ctx.emit(HarvestEvent::CookiesApplied {
            applied: cookies.len(),
            missing: report.missing_critical,
        });

        let transport = self
            .transport
            .clone()
            .ok_or_else(|| HarvestError::Scraper("api strategy used before configure".into()))?;
        let api = &self.ctx.config.api;
        self.client = Some(ApiClient::new(transport, &cookies, &api.region, api.page_size)?);
        Ok(true)
    }

    async fn scrape(&mut self, url: &str) -> Result<Vec<CapturedComment>> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| HarvestError::MissingCredentials("cookies were not applied".into()))?;

        let id = client.resolve_video_id(url).await?;
        info!("视频编号: {}", id);

        let max = self
            .ctx
            .max_comments
            .unwrap_or(self.ctx.config.api.max_comments);
        client.collect(&id, max, &self.ctx).await
    }

    async fn release(&mut self) {
        self.client.take();
        self.transport.take();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::core::config::AppConfig;
    use crate::core::event::{LogLevel, create_event_channel};
    use crate::engine::pacing::Pacing;
    use crate::interfaces::ApiReply;

    #[derive(Default)]
    struct FakeTransport {
        replies: Mutex<VecDeque<ApiReply>>,
        requests: Mutex<Vec<Url>>,
        redirect: Option<String>,
    }

    impl FakeTransport {
        fn with_pages(pages: Vec<serde_json::Value>) -> Self {
            Self {
                replies: Mutex::new(
                    pages
                        .into_iter()
                        .map(|p| ApiReply {
                            status: 200,
                            body: p.to_string(),
                        })
                        .collect(),
                ),
                ..Default::default()
            }
        }

        fn with_body(status: u16, body: &str) -> Self {
            Self {
                replies: Mutex::new(VecDeque::from([ApiReply {
                    status,
                    body: body.to_string(),
                }])),
                ..Default::default()
            }
        }

        fn cursors(&self) -> Vec<String> {
            self.requests
                .lock()
                .iter()
                .map(|u| {
                    u.query_pairs()
                        .find(|(k, _)| k == "cursor")
                        .map(|(_, v)| v.into_owned())
                        .unwrap_or_default()
                })
                .collect()
        }
    }

    #[async_trait]
    impl ApiTransport for FakeTransport {
        async fn get(&self, url: &Url) -> Result<ApiReply> {
            self.requests.lock().push(url.clone());
            self.replies
                .lock()
                .pop_front()
                .ok_or_else(|| HarvestError::Scraper("unexpected request".into()))
        }

        async fn resolve(&self, url: &str) -> Result<String> {
            Ok(self.redirect.clone().unwrap_or_else(|| url.to_string()))
        }
    }

    fn page(start: usize, n: usize, cursor: Option<u64>, has_more: serde_json::Value) -> serde_json::Value {
        let comments: Vec<_> = (start..start + n)
            .map(|i| {
                json!({
                    "cid": i.to_string(),
                    "text": format!("comment {}", i),
                    "digg_count": i,
                    "create_time": 1_700_000_000 + i as i64,
                    "user": { "unique_id": format!("user{}", i), "nickname": "N" }
                })
            })
            .collect();
        let mut v = json!({ "status_code": 0, "comments": comments, "has_more": has_more });
        if let Some(c) = cursor {
            v["cursor"] = json!(c);
        }
        v
    }

    fn cookies() -> CookieSet {
        CookieSet::from_json(
            r#"{"sessionid":"s1","msToken":"tok","tt_chain_token":"dev42"}"#,
            ".tiktok.com",
        )
        .unwrap()
    }

    fn ctx() -> RuntimeContext {
        RuntimeContext::new(Arc::new(AppConfig::default())).with_pacing(Pacing::default())
    }

    fn client(transport: Arc<FakeTransport>) -> ApiClient {
        ApiClient::new(transport, &cookies(), "VN", 50).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn three_pages_yield_one_hundred_comments() {
        let transport = Arc::new(FakeTransport::with_pages(vec![
            page(0, 50, Some(50), json!(1)),
            page(50, 50, Some(100), json!(true)),
            page(100, 0, None, json!(0)),
        ]));

        let comments = client(transport.clone())
            .collect("7300000000000000001", 500, &ctx())
            .await
            .unwrap();

        assert_eq!(comments.len(), 100);
        assert_eq!(transport.requests.lock().len(), 3);
        assert_eq!(transport.cursors(), vec!["0", "50", "100"]);

        assert_eq!(comments[0].author, "@user0");
        assert_eq!(comments[0].timestamp_raw, "1700000000");
        assert_eq!(comments[99].content, "comment 99");
        assert_eq!(comments[99].like_count, 99);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_cursor_advances_by_page_size() {
        let transport = Arc::new(FakeTransport::with_pages(vec![
            page(0, 50, None, json!(true)),
            page(50, 10, None, json!(false)),
        ]));

        let comments = client(transport.clone())
            .collect("1", 500, &ctx())
            .await
            .unwrap();

        assert_eq!(comments.len(), 60);
        assert_eq!(transport.cursors(), vec!["0", "50"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_max_comments() {
        let transport = Arc::new(FakeTransport::with_pages(vec![
            page(0, 50, Some(50), json!(1)),
            page(50, 50, Some(100), json!(1)),
        ]));

        let comments = client(transport.clone())
            .collect("1", 30, &ctx())
            .await
            .unwrap();

        assert_eq!(comments.len(), 30);
        assert_eq!(transport.requests.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_cursor_stops_paging() {
        let pages = (0..200).map(|_| page(0, 20, Some(0), json!(true))).collect();
        let transport = Arc::new(FakeTransport::with_pages(pages));
        let (tx, rx) = create_event_channel();
        let ctx = ctx().with_events(Some(tx));

        let comments = client(transport.clone()).collect("1", 500, &ctx).await.unwrap();

        assert_eq!(comments.len(), 20);
        assert_eq!(transport.requests.lock().len(), 1);
        let warned = std::iter::from_fn(|| rx.try_recv()).any(|e| {
            matches!(e, HarvestEvent::Log { level: LogLevel::Warn, ref message } if message.contains("cursor stalled"))
        });
        assert!(warned);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_page_stops_paging() {
        let transport = Arc::new(FakeTransport::with_pages(vec![
            page(0, 20, Some(20), json!(true)),
            page(0, 20, Some(40), json!(true)),
            page(0, 20, Some(60), json!(true)),
        ]));

        let comments = client(transport.clone()).collect("1", 500, &ctx()).await.unwrap();

        assert_eq!(comments.len(), 20);
        assert_eq!(transport.requests.lock().len(), 2);
    }

    #[tokio::test]
    async fn html_body_without_results_is_bot_detection() {
        let transport = Arc::new(FakeTransport::with_body(
            200,
            "<!DOCTYPE html><html><body>verify</body></html>",
        ));
        let err = client(transport).collect("1", 500, &ctx()).await.unwrap_err();
        assert!(matches!(err, HarvestError::BotDetected(_)));
    }

    #[tokio::test]
    async fn platform_status_codes_are_typed() {
        let cases = [
            (json!({"status_code": 10201, "status_msg": ""}), "ContentNotFound"),
            (json!({"status_code": 10204, "status_msg": "disabled"}), "CommentsDisabled"),
            (json!({"status_code": 1, "status_msg": "Please verify you are human"}), "CaptchaDetected"),
            (json!({"status_code": 7, "status_msg": "rate"}), "Generic"),
        ];
        for (body, expected) in cases {
            let transport = Arc::new(FakeTransport::with_pages(vec![body]));
            let err = client(transport).collect("1", 500, &ctx()).await.unwrap_err();
            assert_eq!(err.kind().to_string(), expected);
        }
    }

    #[test]
    fn page_url_carries_fingerprint_and_tokens() {
        let c = client(Arc::new(FakeTransport::default()));
        let url = c.page_url("123", 50).unwrap();
        let q: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(url.path(), "/api/comment/list/");
        assert_eq!(q["aweme_id"], "123");
        assert_eq!(q["count"], "50");
        assert_eq!(q["cursor"], "50");
        assert_eq!(q["aid"], "1988");
        assert_eq!(q["device_id"], "dev42");
        assert_eq!(q["msToken"], "tok");
        assert_eq!(q["region"], "VN");
        assert_eq!(q["priority_region"], "");
    }

    #[test]
    fn page_size_is_capped() {
        let c = ApiClient::new(Arc::new(FakeTransport::default()), &cookies(), "US", 200).unwrap();
        assert_eq!(c.page_size, MAX_PAGE_SIZE);
    }

    #[test]
    fn token_set_requires_a_session_token() {
        let only_csrf = CookieSet::from_json(r#"{"tt_csrf_token":"x"}"#, ".tiktok.com").unwrap();
        assert!(matches!(
            TokenSet::from_cookies(&only_csrf),
            Err(HarvestError::MissingCredentials(_))
        ));

        let ms_only = CookieSet::from_json(r#"{"msToken":"m"}"#, ".tiktok.com").unwrap();
        let tokens = TokenSet::from_cookies(&ms_only).unwrap();
        assert_eq!(tokens.ms_token.as_deref(), Some("m"));
        assert_eq!(tokens.session_id, None);
    }

    #[test]
    fn random_device_ids_have_nineteen_digits() {
        let c = ApiClient::new(
            Arc::new(FakeTransport::default()),
            &CookieSet::from_json(r#"{"sessionid":"s"}"#, ".tiktok.com").unwrap(),
            "VN",
            50,
        )
        .unwrap();
        assert_eq!(c.device_id.len(), 19);
        assert!(c.device_id.chars().all(|ch| ch.is_ascii_digit()));
    }

    #[tokio::test]
    async fn video_ids_and_short_links() {
        assert_eq!(
            video_id("https://www.tiktok.com/@a/video/7312345678901234567?lang=en").as_deref(),
            Some("7312345678901234567")
        );
        assert_eq!(video_id("https://m.tiktok.com/v/42.html").as_deref(), Some("42"));

        let transport = Arc::new(FakeTransport {
            redirect: Some("https://www.tiktok.com/@x/video/99".into()),
            ..Default::default()
        });
        let c = client(transport);
        assert_eq!(c.resolve_video_id("https://vm.tiktok.com/ZMabc/").await.unwrap(), "99");
        assert!(matches!(
            c.resolve_video_id("https://www.tiktok.com/@x").await,
            Err(HarvestError::Parse(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn strategy_requires_cookies() {
        let mut strategy = ApiStrategy::new(ctx())
            .with_transport(Arc::new(FakeTransport::default()));
        let session = SessionConfig {
            headless: true,
            proxy: None,
            platform: Platform::TikTok,
            cookies: None,
        };
        let err = strategy.configure(&session).await.unwrap_err();
        assert_eq!(err.kind().to_string(), "Configuration");
    }

    #[tokio::test(start_paused = true)]
    async fn strategy_runs_end_to_end() {
        let transport = Arc::new(FakeTransport::with_pages(vec![
            page(0, 50, Some(50), json!(1)),
            page(50, 50, Some(100), json!(1)),
            page(100, 0, None, json!(0)),
        ]));
        let mut strategy = ApiStrategy::new(ctx()).with_transport(transport.clone());
        let session = SessionConfig {
            headless: true,
            proxy: None,
            platform: Platform::TikTok,
            cookies: Some(cookies()),
        };

        strategy.configure(&session).await.unwrap();
        assert!(strategy.apply_cookies().await.unwrap());
        let comments = strategy
            .scrape("https://www.tiktok.com/@a/video/7300000000000000001")
            .await
            .unwrap();
        strategy.release().await;

        assert_eq!(comments.len(), 100);
        assert_eq!(transport.requests.lock().len(), 3);
    }
}
