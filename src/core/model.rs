//! 领域模型 (Domain Model)

use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::error::{HarvestError, Result};
use crate::network::cookies::CookieSet;
use crate::network::proxy::ProxySpec;

/// 目标平台
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    TikTok,
    Facebook,
}

impl Platform {
    /// 依据 URL 纯函数式地选择平台
    pub fn from_url(raw: &str) -> Result<Self> {
        let candidate = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("https://{}", raw)
        };
        let url = Url::parse(&candidate)
            .map_err(|e| HarvestError::Parse(format!("invalid url {}: {}", raw, e)))?;
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();

        if host.contains("tiktok.com") {
            Ok(Platform::TikTok)
        } else if host.contains("facebook.com") || host.contains("fb.watch") {
            Ok(Platform::Facebook)
        } else {
            Err(HarvestError::Parse(format!("unsupported platform: {}", raw)))
        }
    }

    /// Cookie 缺省作用域
    pub fn cookie_domain(&self) -> &'static str {
        match self {
            Platform::TikTok => ".tiktok.com",
            Platform::Facebook => ".facebook.com",
        }
    }

    pub fn home_url(&self) -> &'static str {
        match self {
            Platform::TikTok => "https://www.tiktok.com/",
            Platform::Facebook => "https://www.facebook.com/",
        }
    }

    pub fn login_url(&self) -> &'static str {
        match self {
            Platform::TikTok => "https://www.tiktok.com/login",
            Platform::Facebook => "https://www.facebook.com/login",
        }
    }

    /// 登录态主会话 Cookie
    pub fn session_cookie(&self) -> &'static str {
        match self {
            Platform::TikTok => "sessionid",
            Platform::Facebook => "c_user",
        }
    }

    /// 身份/会话相关的重要 Cookie 白名单
    pub fn important_cookies(&self) -> &'static [&'static str] {
        match self {
            Platform::TikTok => &[
                "msToken",
                "sessionid",
                "odin_tt",
                "ttwid",
                "s_v_web_id",
                "tt_csrf_token",
                "passport_csrf_token",
                "tt-target-idc",
                "tt-target-idc-sign",
                "store-idc",
                "store-country-code",
            ],
            Platform::Facebook => &["c_user", "xs", "datr", "fr", "sb"],
        }
    }

    /// 缺失时仅告警的关键 Cookie
    pub fn critical_cookies(&self) -> &'static [&'static str] {
        match self {
            Platform::TikTok => &["msToken", "sessionid", "odin_tt"],
            Platform::Facebook => &["c_user", "xs"],
        }
    }

    /// 作者提取失败时的占位符
    pub fn unknown_author(&self) -> &'static str {
        match self {
            Platform::TikTok => "@unknown",
            Platform::Facebook => "Unknown",
        }
    }

    /// 无头模式遇到验证码时给出的处理建议
    pub fn captcha_guidance(&self) -> &'static str {
        match self {
            Platform::TikTok => {
                "TikTok requires a human check; run `harvester grab --platform tiktok`, solve it, then retry with the exported cookies"
            }
            Platform::Facebook => {
                "Facebook requires a human check; log in with `harvester grab --platform facebook` and retry with fresh cookies"
            }
        }
    }
}

/// 抓取策略模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
pub enum StrategyMode {
    /// 驱动浏览器渲染页面
    #[default]
    Browser,
    /// 直连内部评论接口
    Api,
}

/// 单次抓取的会话配置，创建后不可变
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub headless: bool,
    pub proxy: Option<ProxySpec>,
    pub platform: Platform,
    pub cookies: Option<CookieSet>,
}

impl SessionConfig {
    pub fn has_cookies(&self) -> bool {
        self.cookies.as_ref().is_some_and(|c| !c.is_empty())
    }
}

/// 抓取到的评论
///
/// 序列化字段名即对外结果记录 (`username`, `content`, `timestamp`, `likes`)。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedComment {
    #[serde(rename = "username")]
    pub author: String,
    pub content: String,
    #[serde(rename = "timestamp")]
    pub timestamp_raw: String,
    #[serde(rename = "likes")]
    pub like_count: u64,
}

/// 媒体评论占位符
pub const MEDIA_PLACEHOLDER: &str = "[Image/Sticker/GIF]";

/// 时间戳缺省值
pub const NO_TIMESTAMP: &str = "N/A";

impl CapturedComment {
    /// 构造评论；空内容替换为媒体占位符，空作者替换为平台占位符
    pub fn new(
        platform: Platform,
        author: impl Into<String>,
        content: impl Into<String>,
        timestamp_raw: Option<String>,
        like_count: u64,
    ) -> Self {
        let author = author.into();
        let content = content.into();
        Self {
            author: if author.trim().is_empty() {
                platform.unknown_author().to_string()
            } else {
                author
            },
            content: if content.trim().is_empty() {
                MEDIA_PLACEHOLDER.to_string()
            } else {
                content
            },
            timestamp_raw: timestamp_raw
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| NO_TIMESTAMP.to_string()),
            like_count,
        }
    }

    /// 去重键，空白折叠后比较
    pub fn dedup_key(&self) -> (String, String) {
        let squash = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
        (squash(&self.author), squash(&self.content))
    }
}
