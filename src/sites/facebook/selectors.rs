//! Facebook 选择器
//!
//! 预编译的 CSS 选择器与页面文案

use std::sync::OnceLock;

use scraper::Selector;

/// 页面已加载的标志
pub const LOAD_MARKERS: &[&str] = &[
    "div[role=\"article\"]",
    "div[role=\"main\"]",
    "div[data-pagelet=\"MainFeed\"]",
    "div.x1yztbdb",
];

/// 评论排序触发按钮
pub const FILTER_TRIGGERS: &[&str] = &["Phù hợp nhất", "Most relevant"];

/// “全部评论”选项
pub const FILTER_ALL: &[&str] = &["Tất cả bình luận", "All comments"];

/// 加载更多一级评论的按钮
pub const REVEAL_PHRASES: &[&str] = &[
    "View more comments",
    "Xem thêm bình luận",
    "previous comments",
    "bình luận trước",
];

pub const UNAVAILABLE: &[&str] = &[
    "This content isn't available",
    "This content isn't available right now",
    "Nội dung này hiện không hiển thị",
    "Trang này không hiển thị",
];

/// 回复层级的 aria 标记
pub const REPLY_MARKERS: &[&str] = &["Reply", "Trả lời", "replies", "phản hồi"];

/// 点赞相关的 aria 标记
pub const LIKE_MARKERS: &[&str] = &["like", "thích", "reaction", "cảm xúc"];

/// 站点选择器集合
pub struct SiteSelectors {
    pub dialog: Selector,
    pub article: Selector,
    pub labelled: Selector,
    pub aria: Selector,
    pub link: Selector,
    pub content: Selector,
    pub emoji: Selector,
    pub button_span: Selector,
    pub span: Selector,
}

static SELECTORS: OnceLock<SiteSelectors> = OnceLock::new();

impl SiteSelectors {
    /// 获取全局选择器实例
    pub fn get() -> &'static SiteSelectors {
        SELECTORS.get_or_init(|| SiteSelectors {
            dialog: Selector::parse("div[role=\"dialog\"]").unwrap(),
            article: Selector::parse("div[role=\"article\"]").unwrap(),
            labelled: Selector::parse("div[aria-label]").unwrap(),
            aria: Selector::parse("[aria-label]").unwrap(),
            link: Selector::parse("a[href]").unwrap(),
            content: Selector::parse("div[dir=\"auto\"]").unwrap(),
            emoji: Selector::parse("img[alt]").unwrap(),
            button_span: Selector::parse(
                "div[role=\"button\"] span, span[role=\"button\"] span",
            )
            .unwrap(),
            span: Selector::parse("span").unwrap(),
        })
    }
}
