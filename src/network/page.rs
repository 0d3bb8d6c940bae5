//! 页面操作封装 (Browser Page)
//!
//! 对 chromiumoxide `Page` 的薄封装：导航、脚本求值、Cookie 读写、点击辅助，
//! 以及验证码探针与两类滚动目标的真实实现。

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::network::{ClearBrowserCookiesParams, CookieParam};
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::core::error::{HarvestError, Result};
use crate::core::model::Platform;
use crate::interfaces::{ChallengeProbe, ScrollState, ScrollSurface};
use crate::network::cookies::{Cookie, CookieSet};

/// 验证控件标记，仅可见元素计数
pub const CAPTCHA_SELECTORS: &[&str] = &[
    ".captcha-verify-container",
    "#captcha-verify-container-main-page",
    "[class*=\"captcha\"]",
    "[id*=\"captcha\"]",
    ".secsdk-captcha-drag-wrapper",
    "[class*=\"Captcha\"]",
    "div[data-testid=\"captcha\"]",
];

/// 滚动容器标记属性
const SCROLL_MARK: &str = "data-harvest-scroll";

const VISIBLE_FN: &str = r#"const visible = (el) => {
  if (!el || !el.isConnected) return false;
  const r = el.getBoundingClientRect();
  const st = window.getComputedStyle(el);
  return r.width > 0 && r.height > 0 && st.visibility !== 'hidden' && st.display !== 'none';
};"#;

pub struct BrowserPage {
    page: Page,
}

impl BrowserPage {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    pub async fn goto(&self, url: &str) -> Result<()> {
        debug!("导航至 {}", url);
        self.page.goto(url).await?;
        Ok(())
    }

    pub async fn reload(&self) -> Result<()> {
        self.page.reload().await?;
        Ok(())
    }

    pub async fn url(&self) -> Result<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    pub async fn title(&self) -> Result<String> {
        Ok(self.page.get_title().await?.unwrap_or_default())
    }

    /// 当前文档的完整 HTML 快照
    pub async fn html(&self) -> Result<String> {
        Ok(self.page.content().await?)
    }

    pub async fn body_text(&self) -> Result<String> {
        self.eval("document.body ? document.body.innerText : ''").await
    }

    /// 求值并反序列化返回值
    pub async fn eval<T: DeserializeOwned>(&self, script: &str) -> Result<T> {
        Ok(self.page.evaluate(script).await?.into_value()?)
    }

    /// 求值返回 `JSON.stringify` 结果的脚本
    pub async fn eval_json<T: DeserializeOwned>(&self, script: &str) -> Result<T> {
        let raw: String = self.eval(script).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub async fn cookies(&self) -> Result<CookieSet> {
        let cookies = self.page.get_cookies().await?;
        Ok(cookies
            .into_iter()
            .map(|c| Cookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                secure: c.secure,
            })
            .collect())
    }

    /// 清空现有 Cookie 后注入新集合，返回成功注入条数
    pub async fn replace_cookies(&self, set: &CookieSet) -> Result<usize> {
        self.page.execute(ClearBrowserCookiesParams::default()).await?;

        let params: Vec<CookieParam> = set
            .iter()
            .filter_map(|c| {
                CookieParam::builder()
                    .name(c.name.clone())
                    .value(c.value.clone())
                    .domain(c.domain.clone())
                    .path(c.path.clone())
                    .secure(c.secure)
                    .build()
                    .map_err(|e| debug!("跳过无效 Cookie {}: {}", c.name, e))
                    .ok()
            })
            .collect();

        let count = params.len();
        if count > 0 {
            self.page.set_cookies(params).await?;
        }
        Ok(count)
    }

    /// 点击第一个可见的匹配元素
    pub async fn click_first_visible(&self, selectors: &[&str]) -> Result<bool> {
        let script = format!(
            r#"(() => {{
  {VISIBLE_FN}
  for (const sel of {sels}) {{
    for (const el of document.querySelectorAll(sel)) {{
      if (visible(el)) {{
        el.scrollIntoView({{block: 'center'}});
        el.click();
        return true;
      }}
    }}
  }}
  return false;
}})()"#,
            sels = json_array(selectors),
        );
        self.eval(&script).await
    }

    /// 点击文本包含任一短语的 `span`，返回点击次数
    pub async fn click_by_text(&self, phrases: &[&str], limit: usize) -> Result<usize> {
        let script = format!(
            r#"(() => {{
  {VISIBLE_FN}
  const phrases = {phrases};
  let clicked = 0;
  for (const el of document.querySelectorAll('span, div[role="button"]')) {{
    if (clicked >= {limit}) break;
    const text = (el.textContent || '').trim();
    if (!text || text.length > 60) continue;
    if (phrases.some(p => text.includes(p)) && visible(el)) {{
      el.scrollIntoView({{block: 'center'}});
      el.click();
      clicked += 1;
    }}
  }}
  return clicked;
}})()"#,
            phrases = json_array(phrases),
        );
        self.eval(&script).await
    }

    /// 等待任一选择器出现
    pub async fn wait_for_any(&self, selectors: &[&str], timeout: Duration) -> Result<bool> {
        let script = format!(
            "(() => {}.some(s => document.querySelector(s) !== null))()",
            json_array(selectors)
        );
        let started = Instant::now();
        loop {
            if self.eval::<bool>(&script).await.unwrap_or(false) {
                return Ok(true);
            }
            if started.elapsed() >= timeout {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    /// 依据标题与正文判断封锁或内容不存在
    pub async fn check_availability(&self, unavailable: &[&str]) -> Result<()> {
        let title = self.title().await.unwrap_or_default().to_lowercase();
        if ["access denied", "403 forbidden", "too many requests"]
            .iter()
            .any(|m| title.contains(m))
        {
            return Err(HarvestError::BotDetected(format!("blocked page title: {}", title)));
        }

        let text = self.body_text().await.unwrap_or_default();
        if let Some(marker) = unavailable.iter().find(|m| text.contains(*m)) {
            return Err(HarvestError::ContentNotFound(marker.to_string()));
        }
        Ok(())
    }

    /// 在平台首页注入 Cookie 后刷新，使其生效
    pub async fn warm_cookies(&self, platform: Platform, set: &CookieSet) -> Result<usize> {
        self.goto(platform.home_url()).await?;
        let applied = self.replace_cookies(set).await?;
        info!("已注入 {} 条 Cookie", applied);
        if let Err(e) = self.reload().await {
            warn!("注入 Cookie 后刷新失败: {}", e);
        }
        Ok(applied)
    }
}

#[async_trait]
impl ChallengeProbe for BrowserPage {
    async fn challenge_visible(&self) -> Result<bool> {
        let script = format!(
            r#"(() => {{
  {VISIBLE_FN}
  return {sels}.some(s => Array.from(document.querySelectorAll(s)).some(visible));
}})()"#,
            sels = json_array(CAPTCHA_SELECTORS),
        );
        self.eval(&script).await
    }
}

/// 以文档主体为滚动目标
pub struct DocumentSurface<'a> {
    page: &'a BrowserPage,
    step_px: i64,
}

impl<'a> DocumentSurface<'a> {
    pub fn new(page: &'a BrowserPage, step_px: i64) -> Self {
        Self { page, step_px }
    }
}

const DOCUMENT_STATE: &str = r#"JSON.stringify({
  offset: window.pageYOffset || document.documentElement.scrollTop || 0,
  extent: Math.max(document.body ? document.body.scrollHeight : 0, document.documentElement.scrollHeight || 0),
  viewport: window.innerHeight || 0
})"#;

#[async_trait]
impl ScrollSurface for DocumentSurface<'_> {
    async fn measure(&self) -> Result<ScrollState> {
        self.page.eval_json(DOCUMENT_STATE).await
    }

    async fn step(&self) -> Result<()> {
        self.page
            .eval::<serde_json::Value>(&format!("window.scrollBy(0, {}); true", self.step_px))
            .await?;
        Ok(())
    }

    async fn nudge_back(&self, px: i64) -> Result<()> {
        self.page
            .eval::<serde_json::Value>(&format!("window.scrollBy(0, -{}); true", px))
            .await?;
        Ok(())
    }

    async fn to_end(&self) -> Result<()> {
        self.page
            .eval::<serde_json::Value>(
                "window.scrollTo(0, document.body ? document.body.scrollHeight : 0); true",
            )
            .await?;
        Ok(())
    }
}

/// 以评论容器为滚动目标
///
/// 容器由扫描选出（对话框内滚动余量最大的 div），并以标记属性缓存；
/// 标记元素失联或隐藏时重新扫描，找不到容器时退回文档滚动。
pub struct ContainerSurface<'a> {
    page: &'a BrowserPage,
    reveal_phrases: &'a [&'a str],
}

impl<'a> ContainerSurface<'a> {
    pub fn new(page: &'a BrowserPage, reveal_phrases: &'a [&'a str]) -> Self {
        Self {
            page,
            reveal_phrases,
        }
    }
}

fn target_expr() -> String {
    format!(
        "(document.querySelector('[{SCROLL_MARK}]') || document.scrollingElement || document.documentElement)"
    )
}

fn locate_script() -> String {
    format!(
        r#"(() => {{
  const MARK = '{SCROLL_MARK}';
  const prev = document.querySelector('[' + MARK + ']');
  if (prev && prev.isConnected && prev.offsetParent !== null && prev.scrollHeight - prev.clientHeight > 40) {{
    return 'cached';
  }}
  if (prev) prev.removeAttribute(MARK);
  let best = null;
  let bestDelta = 40;
  const consider = (el) => {{
    const delta = el.scrollHeight - el.clientHeight;
    if (delta > bestDelta && el.offsetParent !== null) {{ best = el; bestDelta = delta; }}
  }};
  const dialog = document.querySelector('div[role="dialog"]');
  if (dialog) dialog.querySelectorAll('div').forEach(consider);
  if (!best) {{
    document.querySelectorAll('div[data-pagelet*="Comment"], div[aria-label*="Comment"], div[aria-label*="Bình luận"]').forEach(consider);
  }}
  if (!best) return 'document';
  best.setAttribute(MARK, '1');
  return 'located:' + bestDelta;
}})()"#
    )
}

#[async_trait]
impl ScrollSurface for ContainerSurface<'_> {
    async fn ensure_target(&self) -> Result<()> {
        let outcome: String = self.page.eval(&locate_script()).await?;
        if outcome != "cached" {
            debug!("滚动容器定位结果: {}", outcome);
        }
        Ok(())
    }

    async fn measure(&self) -> Result<ScrollState> {
        let script = format!(
            "(() => {{ const el = {}; return JSON.stringify({{offset: el.scrollTop, extent: el.scrollHeight, viewport: el.clientHeight}}); }})()",
            target_expr()
        );
        self.page.eval_json(&script).await
    }

    async fn step(&self) -> Result<()> {
        let script = format!(
            "(() => {{ const el = {}; el.scrollTop = el.scrollTop + Math.max(900, el.clientHeight * 1.8); return true; }})()",
            target_expr()
        );
        self.page.eval::<bool>(&script).await?;
        Ok(())
    }

    async fn nudge_back(&self, px: i64) -> Result<()> {
        let script = format!(
            "(() => {{ const el = {}; el.scrollTop = Math.max(0, el.scrollTop - {}); return true; }})()",
            target_expr(),
            px
        );
        self.page.eval::<bool>(&script).await?;
        Ok(())
    }

    async fn to_end(&self) -> Result<()> {
        let script = format!(
            "(() => {{ const el = {}; el.scrollTop = el.scrollHeight; return true; }})()",
            target_expr()
        );
        self.page.eval::<bool>(&script).await?;
        Ok(())
    }

    async fn reveal_more(&self) -> Result<usize> {
        if self.reveal_phrases.is_empty() {
            return Ok(0);
        }
        self.page.click_by_text(self.reveal_phrases, 3).await
    }
}

fn json_array(items: &[&str]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}
