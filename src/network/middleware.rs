use reqwest::{Request, Response, StatusCode};
use reqwest_middleware::{Middleware, Next, Result};
use tracing::{debug, warn};

use crate::core::error::HarvestError;

/// 接口请求标签，随请求扩展传递，仅用于日志
#[derive(Clone, Debug)]
pub struct RequestLabel(pub String);

/// 封禁检测中间件
///
/// 403/429 视为平台的反爬拦截，直接上报 `BotDetected`；其余状态码交由调用方解析。
pub struct BlockDetectMiddleware;

#[async_trait::async_trait]
impl Middleware for BlockDetectMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        let label = extensions
            .get::<RequestLabel>()
            .map(|l| l.0.clone())
            .unwrap_or_else(|| req.url().path().to_string());

        let resp = next.run(req, extensions).await?;
        let status = resp.status();
        debug!("{} -> {}", label, status);

        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            warn!("{} 被拦截 (HTTP {})", label, status);
            return Err(reqwest_middleware::Error::from(anyhow::Error::new(
                HarvestError::BotDetected(format!("HTTP {} from {}", status.as_u16(), label)),
            )));
        }

        Ok(resp)
    }
}
