use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, ORIGIN, REFERER, USER_AGENT};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use tracing::debug;
use url::Url;

use crate::core::error::{HarvestError, Result};
use crate::interfaces::{ApiReply, ApiTransport};
use crate::network::cookies::CookieSet;
use crate::network::middleware::{BlockDetectMiddleware, RequestLabel};
use crate::network::proxy::ProxySpec;

/// 直连接口所用 HTTP 服务
///
/// Cookie 在构建时写入仓库，之后随请求自动携带。
#[derive(Clone)]
pub struct HttpService {
    client: ClientWithMiddleware,
}

#[derive(Debug, Clone, bon::Builder)]
pub struct HttpOptions {
    pub user_agent: String,
    pub referer: String,
    pub proxy: Option<ProxySpec>,
    #[builder(default = 30)]
    pub timeout_secs: u64,
    pub cookies: Option<CookieSet>,
}

impl HttpService {
    pub fn new(opts: &HttpOptions) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        if let Some(cookies) = &opts.cookies {
            let applied = cookies.apply_to_jar(&jar);
            debug!("HTTP 客户端载入 {} 条 Cookie", applied);
        }

        let mut headers = HeaderMap::new();
        let base = [
            (USER_AGENT, opts.user_agent.as_str()),
            (ACCEPT, "application/json, text/plain, */*"),
            (ACCEPT_LANGUAGE, "en-US,en;q=0.9"),
            (REFERER, opts.referer.as_str()),
            (ORIGIN, opts.referer.trim_end_matches('/')),
        ];
        headers.extend(
            base.into_iter()
                .filter(|(_, v)| !v.is_empty())
                .filter_map(|(k, v)| HeaderValue::from_str(v).ok().map(|val| (k, val))),
        );
        headers.insert(
            "sec-ch-ua",
            HeaderValue::from_static("\"Chromium\";v=\"124\", \"Google Chrome\";v=\"124\", \"Not-A.Brand\";v=\"99\""),
        );

        let mut builder = reqwest::Client::builder()
            .cookie_provider(jar)
            .default_headers(headers)
            .tcp_nodelay(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(opts.timeout_secs.max(1)));

        if let Some(proxy) = &opts.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy.url_with_auth())?);
        }

        let client = builder.build()?;

        Ok(Self {
            client: ClientBuilder::new(client).with(BlockDetectMiddleware).build(),
        })
    }
}

#[async_trait]
impl ApiTransport for HttpService {
    async fn get(&self, url: &Url) -> Result<ApiReply> {
        let resp = self
            .client
            .get(url.clone())
            .with_extension(RequestLabel(url.path().to_string()))
            .send()
            .await
            .map_err(|e| HarvestError::Middleware(e).flatten())?;

        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok(ApiReply { status, body })
    }

    async fn resolve(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .with_extension(RequestLabel("resolve".into()))
            .send()
            .await
            .map_err(|e| HarvestError::Middleware(e).flatten())?;
        Ok(resp.url().to_string())
    }
}
