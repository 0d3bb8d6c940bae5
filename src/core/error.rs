//! 错误处理体系 (Error Handling System)
//!
//! 定义抓取领域的错误类型、验证码阻断原因、环境初始化失败以及全局 Result 别名。

use reqwest::StatusCode;
use thiserror::Error;

/// 验证码阻断原因 (Captcha Causes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptchaCause {
    /// 无头模式下检测到验证码，人工无法介入
    Headless { guidance: String },
    /// 有头模式下等待人工处理超时
    TimedOut { waited_secs: u64 },
    /// 接口层返回了验证要求
    ApiVerification(String),
}

impl std::fmt::Display for CaptchaCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptchaCause::Headless { guidance } => write!(f, "detected while headless: {}", guidance),
            CaptchaCause::TimedOut { waited_secs } => {
                write!(f, "not solved within {}s", waited_secs)
            }
            CaptchaCause::ApiVerification(msg) => write!(f, "api verification required: {}", msg),
        }
    }
}

/// 运行环境初始化失败 (Setup Failures)
///
/// 与抓取失败严格区分：说明当前环境根本无法运行引擎。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupFailure {
    /// 找不到可控的浏览器进程
    BrowserUnavailable(String),
    /// 代理认证扩展打包失败
    ProxyExtension(String),
}

impl std::fmt::Display for SetupFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SetupFailure::BrowserUnavailable(s) => write!(f, "browser unavailable: {}", s),
            SetupFailure::ProxyExtension(s) => write!(f, "proxy extension packaging failed: {}", s),
        }
    }
}

/// 面向调用方的失败分类 (Failure Taxonomy)
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum FailureKind {
    BotDetected,
    CaptchaDetected,
    ContentNotFound,
    CommentsDisabled,
    Configuration,
    Generic,
    Setup,
}

/// 全局错误定义 (Harvest Domain Errors)
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Bot detected: {0}")]
    BotDetected(String),

    #[error("Captcha detected ({0})")]
    CaptchaDetected(CaptchaCause),

    #[error("Content not found: {0}")]
    ContentNotFound(String),

    #[error("Comments disabled: {0}")]
    CommentsDisabled(String),

    /// 直连接口缺少可用凭据
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Setup failure: {0}")]
    Setup(SetupFailure),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Middleware error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Parsing error: {0}")]
    Parse(String),

    #[error("Scraper error: {0}")]
    Scraper(String),
}

/// 全局 Result 别名
pub type Result<T> = std::result::Result<T, HarvestError>;

impl HarvestError {
    /// 将错误归入调用方可见的分类
    ///
    /// 支持中间件嵌套错误的分层解包 (Downcasting)。
    pub fn kind(&self) -> FailureKind {
        match self {
            HarvestError::BotDetected(_) => FailureKind::BotDetected,
            HarvestError::CaptchaDetected(_) => FailureKind::CaptchaDetected,
            HarvestError::ContentNotFound(_) => FailureKind::ContentNotFound,
            HarvestError::CommentsDisabled(_) => FailureKind::CommentsDisabled,
            HarvestError::MissingCredentials(_) | HarvestError::Config(_) => {
                FailureKind::Configuration
            }
            HarvestError::Setup(_) => FailureKind::Setup,
            HarvestError::Middleware(reqwest_middleware::Error::Middleware(inner)) => inner
                .downcast_ref::<HarvestError>()
                .map(HarvestError::kind)
                .unwrap_or(FailureKind::Generic),
            HarvestError::Network(e) if is_block_status(e.status()) => FailureKind::BotDetected,
            _ => FailureKind::Generic,
        }
    }

    /// 是否为环境级致命错误
    pub fn is_setup(&self) -> bool {
        self.kind() == FailureKind::Setup
    }

    /// 展开中间件包装，取出内部的领域错误
    pub fn flatten(self) -> Self {
        match self {
            HarvestError::Middleware(reqwest_middleware::Error::Middleware(inner)) => {
                match inner.downcast::<HarvestError>() {
                    Ok(e) => e,
                    Err(other) => HarvestError::Scraper(other.to_string()),
                }
            }
            other => other,
        }
    }
}

fn is_block_status(status: Option<StatusCode>) -> bool {
    matches!(
        status,
        Some(StatusCode::FORBIDDEN) | Some(StatusCode::TOO_MANY_REQUESTS)
    )
}

impl From<chromiumoxide::error::CdpError> for HarvestError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        HarvestError::Browser(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn middleware_wrapped_errors_keep_their_kind() {
        let inner = anyhow::Error::new(HarvestError::BotDetected("HTTP 429".into()));
        let err = HarvestError::Middleware(reqwest_middleware::Error::Middleware(inner));
        assert_eq!(err.kind(), FailureKind::BotDetected);
        assert!(matches!(err.flatten(), HarvestError::BotDetected(_)));
    }

    #[test]
    fn setup_failures_are_distinct_from_scrape_failures() {
        let err = HarvestError::Setup(SetupFailure::BrowserUnavailable("no chrome".into()));
        assert!(err.is_setup());
        assert!(!HarvestError::Browser("tab crashed".into()).is_setup());
        assert_eq!(HarvestError::Parse("x".into()).kind(), FailureKind::Generic);
    }
}
