//! TikTok 选择器
//!
//! 预编译的 CSS 选择器

use std::sync::OnceLock;

use scraper::Selector;

/// 页面内点击展开评论区的按钮
pub const COMMENT_BUTTONS: &[&str] = &[
    "[data-e2e=\"comment-icon\"]",
    "[data-e2e=\"browse-comment-icon\"]",
    "button[aria-label*=\"comment\" i]",
    "span[data-e2e=\"comment-count\"]",
];

/// 视频不存在或已下架的提示
pub const UNAVAILABLE: &[&str] = &[
    "Video currently unavailable",
    "This video is unavailable",
    "Couldn't find this account",
    "Video không khả dụng",
];

/// 站点选择器集合
pub struct SiteSelectors {
    /// 评论节点，按优先级排列
    pub comment_nodes: Vec<Selector>,
    pub item_container: Selector,
    pub profile_link: Selector,
    pub time: Selector,
    pub span: Selector,
    pub image: Selector,
    pub aria_like: Selector,
    pub like_count: Vec<Selector>,
}

static SELECTORS: OnceLock<SiteSelectors> = OnceLock::new();

impl SiteSelectors {
    /// 获取全局选择器实例
    pub fn get() -> &'static SiteSelectors {
        SELECTORS.get_or_init(|| SiteSelectors {
            comment_nodes: vec![
                Selector::parse("[data-e2e=\"comment-level-1\"]").unwrap(),
                Selector::parse("[data-e2e=\"comment-level-1\"] p").unwrap(),
                Selector::parse("span[data-e2e=\"comment-level-1\"]").unwrap(),
            ],
            item_container: Selector::parse(
                "div[class*=\"CommentItem\"], div[class*=\"comment-item\"]",
            )
            .unwrap(),
            profile_link: Selector::parse("a[href*=\"@\"]").unwrap(),
            time: Selector::parse("[data-e2e^=\"comment-time\"]").unwrap(),
            span: Selector::parse("span").unwrap(),
            image: Selector::parse("img").unwrap(),
            aria_like: Selector::parse("[aria-label*=\"like\"], [aria-label*=\"Like\"]").unwrap(),
            like_count: vec![
                Selector::parse("[data-e2e=\"comment-like-count\"]").unwrap(),
                Selector::parse("div[class*=\"LikeContainer\"] span").unwrap(),
                Selector::parse("span[class*=\"LikeCount\"]").unwrap(),
            ],
        })
    }
}
