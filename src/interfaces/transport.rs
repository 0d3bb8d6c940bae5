//! 接口传输层 (API Transport)

use async_trait::async_trait;
use url::Url;

use crate::core::error::Result;

/// 接口应答
#[derive(Debug, Clone)]
pub struct ApiReply {
    pub status: u16,
    pub body: String,
}

/// 直连接口客户端依赖的最小传输能力
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn get(&self, url: &Url) -> Result<ApiReply>;

    /// 跟随跳转，返回最终地址
    async fn resolve(&self, url: &str) -> Result<String>;
}
