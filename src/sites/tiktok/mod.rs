//! TikTok 站点模块

pub mod api;
mod extract;
mod selectors;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::core::error::Result;
use crate::core::model::{CapturedComment, Platform};
use crate::engine::pacing::Pacing;
use crate::interfaces::ScrollSurface;
use crate::network::page::{BrowserPage, DocumentSurface};
use crate::sites::PlatformAdapter;

pub use self::extract::{parse_comments, user_from_href};
pub use self::selectors::SiteSelectors;

/// 单步滚动像素
const SCROLL_STEP_PX: i64 = 1200;

/// TikTok 浏览器适配
pub struct TikTokAdapter;

#[async_trait]
impl PlatformAdapter for TikTokAdapter {
    fn platform(&self) -> Platform {
        Platform::TikTok
    }

    fn unavailable_markers(&self) -> &'static [&'static str] {
        selectors::UNAVAILABLE
    }

    /// 新版视频页评论区默认展开，找不到按钮不算失败
    async fn prepare(&self, page: &BrowserPage, pacing: &Pacing) -> Result<()> {
        match page.click_first_visible(selectors::COMMENT_BUTTONS).await {
            Ok(true) => info!("已打开评论区"),
            Ok(false) => debug!("未找到评论按钮，评论区可能已展开"),
            Err(e) => debug!("点击评论按钮失败: {}", e),
        }
        pacing.pause(pacing.settle).await;
        Ok(())
    }

    fn surface<'a>(&'a self, page: &'a BrowserPage) -> Box<dyn ScrollSurface + 'a> {
        Box::new(DocumentSurface::new(page, SCROLL_STEP_PX))
    }

    fn extract(&self, html: &str, limit: Option<usize>) -> Vec<CapturedComment> {
        parse_comments(html, limit)
    }
}
