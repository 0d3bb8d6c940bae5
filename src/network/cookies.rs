//! Cookie 归一化 (Cookie Normalizer)
//!
//! 将多种导出格式统一为有序的 [`CookieSet`]，并负责注入 HTTP 客户端的 Cookie 仓库。
//! 浏览器侧的注入见 `network::page`。

use indexmap::IndexMap;
use reqwest::cookie::Jar;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::core::model::Platform;

/// 外部输入的 Cookie 条目
///
/// 兼容 J2TEAM 等扩展导出的多余字段 (`httpOnly`、`expirationDate` 等)，直接忽略。
#[derive(Debug, Clone, Deserialize)]
pub struct RawCookie {
    pub name: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub secure: Option<bool>,
}

/// 可接受的 Cookie 载荷形态
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CookiePayload {
    /// 裸数组
    List(Vec<RawCookie>),
    /// `{url, cookies: [...]}` 信封
    Envelope {
        #[serde(default)]
        url: Option<String>,
        cookies: Vec<RawCookie>,
    },
    /// 旧版单条 `{name, value}`
    Single(RawCookie),
    /// `{name: value}` 映射
    Map(IndexMap<String, String>),
    /// 被二次编码为字符串的任意形态
    Encoded(String),
}

impl CookiePayload {
    /// 从 JSON 文本解析载荷
    pub fn from_json(text: &str) -> Option<Self> {
        match serde_json::from_str::<CookiePayload>(text.trim()) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!("Cookie 载荷无法解析，将以无 Cookie 模式继续: {}", e);
                None
            }
        }
    }
}

/// 规范化后的 Cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub secure: bool,
}

/// 有序 Cookie 序列；同名不去重，读取时后写优先
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CookieSet {
    cookies: Vec<Cookie>,
}

/// 重要 Cookie 的检出报告
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CookieReport {
    pub found: Vec<String>,
    pub missing: Vec<String>,
    pub missing_critical: Vec<String>,
}

/// `{url, cookies}` 导出信封
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieEnvelope {
    pub url: String,
    pub cookies: CookieSet,
}

const MAX_ENCODING_DEPTH: usize = 2;

impl CookieSet {
    pub fn new(cookies: Vec<Cookie>) -> Self {
        Self { cookies }
    }

    /// 归一化任意载荷；无法识别时返回 `None`，调用方按无 Cookie 继续
    pub fn normalize(payload: &CookiePayload, default_domain: &str) -> Option<Self> {
        Self::normalize_inner(payload, default_domain, 0)
    }

    fn normalize_inner(payload: &CookiePayload, default_domain: &str, depth: usize) -> Option<Self> {
        let raw: Vec<RawCookie> = match payload {
            CookiePayload::List(list) => list.clone(),
            CookiePayload::Envelope { cookies, .. } => cookies.clone(),
            CookiePayload::Single(c) => vec![c.clone()],
            CookiePayload::Map(map) => map
                .iter()
                .map(|(name, value)| RawCookie {
                    name: name.clone(),
                    value: value.clone(),
                    domain: None,
                    path: None,
                    secure: None,
                })
                .collect(),
            CookiePayload::Encoded(text) => {
                if depth >= MAX_ENCODING_DEPTH {
                    return None;
                }
                let inner = serde_json::from_str::<CookiePayload>(text).ok()?;
                return Self::normalize_inner(&inner, default_domain, depth + 1);
            }
        };

        let cookies: Vec<Cookie> = raw
            .into_iter()
            .filter(|c| !c.name.trim().is_empty())
            .map(|c| Cookie {
                name: c.name.trim().to_string(),
                value: c.value,
                domain: c
                    .domain
                    .filter(|d| !d.trim().is_empty())
                    .unwrap_or_else(|| default_domain.to_string()),
                path: c
                    .path
                    .filter(|p| !p.trim().is_empty())
                    .unwrap_or_else(|| "/".to_string()),
                secure: c.secure.unwrap_or(false),
            })
            .collect();

        debug!("Cookie 归一化完成，共 {} 条", cookies.len());
        Some(Self { cookies })
    }

    /// 从 JSON 文本一步完成解析与归一化
    pub fn from_json(text: &str, default_domain: &str) -> Option<Self> {
        CookiePayload::from_json(text).and_then(|p| Self::normalize(&p, default_domain))
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cookie> {
        self.cookies.iter()
    }

    /// 按名称读取，后写优先
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .rev()
            .find(|c| c.name == name)
            .map(|c| c.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some_and(|v| !v.is_empty())
    }

    /// 对照平台白名单生成检出报告
    pub fn report(&self, platform: Platform) -> CookieReport {
        let (found, missing): (Vec<&str>, Vec<&str>) = platform
            .important_cookies()
            .iter()
            .partition(|name| self.contains(name));

        let missing_critical = platform
            .critical_cookies()
            .iter()
            .filter(|name| !self.contains(name))
            .map(|s| s.to_string())
            .collect();

        CookieReport {
            found: found.into_iter().map(String::from).collect(),
            missing: missing.into_iter().map(String::from).collect(),
            missing_critical,
        }
    }

    /// 记录检出情况；缺失关键 Cookie 只告警
    pub fn log_report(&self, platform: Platform) -> CookieReport {
        let report = self.report(platform);
        info!(
            "Cookie 检出 {}/{}: {:?}",
            report.found.len(),
            platform.important_cookies().len(),
            report.found
        );
        if !report.missing.is_empty() {
            debug!("缺失 Cookie: {:?}", report.missing);
        }
        if !report.missing_critical.is_empty() {
            warn!(
                "缺失关键 Cookie {:?}，抓取成功率可能下降",
                report.missing_critical
            );
        }
        report
    }

    /// 注入 reqwest 的 Cookie 仓库
    pub fn apply_to_jar(&self, jar: &Jar) -> usize {
        let mut applied = 0;
        for cookie in &self.cookies {
            let host = cookie.domain.trim_start_matches('.');
            let Ok(url) = Url::parse(&format!("https://{}/", host)) else {
                debug!("跳过无法构造 URL 的 Cookie 域: {}", cookie.domain);
                continue;
            };
            let mut line = format!(
                "{}={}; Domain={}; Path={}",
                cookie.name, cookie.value, cookie.domain, cookie.path
            );
            if cookie.secure {
                line.push_str("; Secure");
            }
            jar.add_cookie_str(&line, &url);
            applied += 1;
        }
        applied
    }

    pub fn into_envelope(self, url: impl Into<String>) -> CookieEnvelope {
        CookieEnvelope {
            url: url.into(),
            cookies: self,
        }
    }
}

impl FromIterator<Cookie> for CookieSet {
    fn from_iter<T: IntoIterator<Item = Cookie>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// 部分导出工具把数值型 value 写成数字
fn scalar_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}
