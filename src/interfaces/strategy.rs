//! 抓取策略接口 (Comment Strategy)

use async_trait::async_trait;

use crate::core::error::Result;
use crate::core::model::{CapturedComment, Platform, SessionConfig};

/// 一个平台的一种抓取方式
///
/// 调用顺序固定为 `configure → apply_cookies → scrape → release`；
/// `release` 在任何结局下都必须被调用。
#[async_trait]
pub trait CommentStrategy: Send {
    fn platform(&self) -> Platform;

    /// 按会话配置准备底层资源（浏览器进程或 HTTP 会话）
    async fn configure(&mut self, session: &SessionConfig) -> Result<()>;

    /// 注入会话 Cookie；无 Cookie 或注入失败时返回 `false`
    async fn apply_cookies(&mut self) -> Result<bool>;

    async fn scrape(&mut self, url: &str) -> Result<Vec<CapturedComment>>;

    /// 释放底层资源，可重复调用
    async fn release(&mut self);
}
