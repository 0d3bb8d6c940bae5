//! 代理轮换器 (Proxy Rotator)
//!
//! 持有配置中的代理列表，按随机或顺序方式发放；顺序模式下的排序持久化到
//! `<cache_path>/proxy_order.json`，失效代理被降到队尾。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use flume::{Receiver, Sender};
use rand::seq::IndexedRandom;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::config::{AppConfig, Rotation};
use crate::network::proxy::ProxySpec;

const ORDER_FILE: &str = "proxy_order.json";

pub enum ProxyMsg {
    /// 取下一个代理；池为空时回复 `None`
    Next { reply: oneshot::Sender<Option<String>> },
    /// 报告代理失效
    ReportFailure { proxy: String },
}

pub struct ProxyRotator {
    rx: Receiver<ProxyMsg>,
    proxies: Vec<String>,
    rotation: Rotation,
    order_file: PathBuf,
}

impl ProxyRotator {
    pub async fn start(config: Arc<AppConfig>) -> (Sender<ProxyMsg>, JoinHandle<()>) {
        let (tx, rx) = flume::unbounded();

        let proxies: Vec<String> = config
            .proxy
            .list
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .filter(|p| match ProxySpec::parse(p) {
                Ok(_) => true,
                Err(e) => {
                    warn!("忽略无效代理 {}: {}", p, e);
                    false
                }
            })
            .map(String::from)
            .collect();

        let order_file = Path::new(&config.cache_path).join(ORDER_FILE);
        let rotation = config.proxy.rotation;
        let proxies = match rotation {
            Rotation::Sequential => restore_order(proxies, &order_file).await,
            Rotation::Random => proxies,
        };
        info!("代理池就绪: {} 个代理，轮换方式 {:?}", proxies.len(), rotation);

        let mut actor = ProxyRotator {
            rx,
            proxies,
            rotation,
            order_file,
        };
        let handle = tokio::spawn(async move {
            actor.run().await;
        });

        (tx, handle)
    }

    async fn run(&mut self) {
        while let Ok(msg) = self.rx.recv_async().await {
            match msg {
                ProxyMsg::Next { reply } => {
                    let picked = self.next().await;
                    let _ = reply.send(picked);
                }
                ProxyMsg::ReportFailure { proxy } => {
                    self.demote(&proxy).await;
                }
            }
        }
        debug!("代理轮换器退出");
    }

    async fn next(&mut self) -> Option<String> {
        match self.rotation {
            Rotation::Random => self.proxies.choose(&mut rand::rng()).cloned(),
            Rotation::Sequential => {
                let head = self.proxies.first().cloned()?;
                self.proxies.rotate_left(1);
                self.save_order().await;
                Some(head)
            }
        }
    }

    async fn demote(&mut self, proxy: &str) {
        let Some(pos) = self.proxies.iter().position(|p| p == proxy) else {
            debug!("忽略未知代理的失效报告: {}", proxy);
            return;
        };
        warn!("代理 {} 失效，降低优先级", proxy);
        let failed = self.proxies.remove(pos);
        self.proxies.push(failed);
        if self.rotation == Rotation::Sequential {
            self.save_order().await;
        }
    }

    async fn save_order(&self) {
        let Ok(json) = serde_json::to_string_pretty(&self.proxies) else {
            return;
        };
        if let Some(dir) = self.order_file.parent()
            && let Err(e) = tokio::fs::create_dir_all(dir).await
        {
            warn!("创建缓存目录失败: {}", e);
            return;
        }
        if let Err(e) = tokio::fs::write(&self.order_file, json).await {
            warn!("保存代理排序失败: {}", e);
        }
    }
}

/// 按缓存的排序重排；新增代理排在末尾，已删除的丢弃
async fn restore_order(mut proxies: Vec<String>, order_file: &Path) -> Vec<String> {
    let Ok(json) = tokio::fs::read_to_string(order_file).await else {
        return proxies;
    };
    let Ok(saved) = serde_json::from_str::<Vec<String>>(&json) else {
        warn!("代理排序缓存已损坏，忽略");
        return proxies;
    };
    debug!("加载缓存的代理排序 ({} 条记录)", saved.len());

    let mut ordered = Vec::with_capacity(proxies.len());
    for entry in saved {
        if let Some(pos) = proxies.iter().position(|p| *p == entry) {
            ordered.push(proxies.remove(pos));
        }
    }
    ordered.extend(proxies);
    ordered
}

/// 向轮换器请求一个代理
pub async fn next_proxy(tx: &Sender<ProxyMsg>) -> Option<String> {
    let (reply, rx) = oneshot::channel();
    tx.send_async(ProxyMsg::Next { reply }).await.ok()?;
    rx.await.ok().flatten()
}
