//! Facebook 站点模块

mod extract;
mod selectors;

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::core::error::Result;
use crate::core::model::{CapturedComment, Platform};
use crate::engine::pacing::Pacing;
use crate::interfaces::ScrollSurface;
use crate::network::page::{BrowserPage, ContainerSurface};
use crate::sites::PlatformAdapter;

pub use self::extract::{parse_comments, user_from_href};
pub use self::selectors::SiteSelectors;

const LOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Facebook 浏览器适配
pub struct FacebookAdapter;

impl FacebookAdapter {
    /// 排序从“最相关”切到“全部评论”；失败只告警
    async fn switch_to_all_comments(&self, page: &BrowserPage, pacing: &Pacing) -> bool {
        match page.click_by_text(selectors::FILTER_TRIGGERS, 1).await {
            Ok(0) => {
                debug!("未找到评论排序按钮，可能已是全部评论");
                return false;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("打开评论排序失败: {}", e);
                return false;
            }
        }
        pacing.pause(pacing.settle).await;

        match page.click_by_text(selectors::FILTER_ALL, 1).await {
            Ok(n) if n > 0 => {
                info!("已切换为全部评论");
                pacing.pause(pacing.settle).await;
                true
            }
            Ok(_) => {
                debug!("排序菜单中没有“全部评论”选项");
                false
            }
            Err(e) => {
                warn!("切换全部评论失败: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl PlatformAdapter for FacebookAdapter {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    fn unavailable_markers(&self) -> &'static [&'static str] {
        selectors::UNAVAILABLE
    }

    async fn prepare(&self, page: &BrowserPage, pacing: &Pacing) -> Result<()> {
        if !page.wait_for_any(selectors::LOAD_MARKERS, LOAD_TIMEOUT).await? {
            warn!("未等到主内容容器，继续处理");
        }

        self.switch_to_all_comments(page, pacing).await;

        page.eval::<bool>("(() => { window.scrollTo(0, 800); return true; })()")
            .await?;
        pacing.pause(pacing.settle).await;
        Ok(())
    }

    fn surface<'a>(&'a self, page: &'a BrowserPage) -> Box<dyn ScrollSurface + 'a> {
        Box::new(ContainerSurface::new(page, selectors::REVEAL_PHRASES))
    }

    fn extract(&self, html: &str, limit: Option<usize>) -> Vec<CapturedComment> {
        parse_comments(html, limit)
    }
}
