//! Facebook 评论解析
//!
//! 评论卡片压平后第一行总是作者名：剩余两行及以上时无条件丢弃首行；
//! 仅剩一行时按纯媒体评论处理，不把作者名当成正文。

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html};
use tracing::debug;
use url::Url;

use crate::core::model::{CapturedComment, Platform};
use crate::extract::text::{flatten_lines, flatten_text, is_junk_line, is_timestamp};
use crate::extract::{CommentBook, Probe, first_match};

use super::selectors::{LIKE_MARKERS, REPLY_MARKERS, SiteSelectors};

static FIRST_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)").expect("valid regex"));

const REJECTED_PATHS: &[&str] = &[
    "/posts/",
    "/videos/",
    "/watch/",
    "/story.php",
    "/photo",
    "/sharer.php",
    "/hashtag/",
    "/reel/",
    "/share/",
    "/groups/",
    "/l.php",
];

const SYSTEM_SEGMENTS: &[&str] = &[
    "watch",
    "groups",
    "gaming",
    "pages",
    "friends",
    "events",
    "messages",
    "media",
    "dialog",
    "share",
    "reel",
    "story",
    "stories",
    "marketplace",
    "live",
    "fundraisers",
    "saved",
    "offers",
];

const TIME_WORDS: &[&str] = &["giờ", "phút", "ngày", "tuần", "h ", "m ", "d ", "w "];

/// 从页面快照中解析一级评论
pub fn parse_comments(html: &str, limit: Option<usize>) -> Vec<CapturedComment> {
    let doc = Html::parse_document(html);
    let s = SiteSelectors::get();

    let root = doc
        .select(&s.dialog)
        .next()
        .unwrap_or_else(|| doc.root_element());

    let mut nodes: Vec<ElementRef<'_>> = root.select(&s.article).collect();
    if nodes.len() < 2 {
        nodes = root.select(&s.labelled).collect();
    }
    debug!("Facebook 候选评论节点 {} 个", nodes.len());

    let mut book = CommentBook::with_limit(limit);
    let mut replies = 0usize;
    for node in nodes {
        if book.is_full() {
            break;
        }
        if is_reply(node) {
            replies += 1;
            continue;
        }
        if let Some(comment) = parse_node(node) {
            book.insert(comment);
        }
    }
    if replies > 0 {
        debug!("跳过 {} 条回复", replies);
    }
    book.into_vec()
}

/// 自身或祖先带有回复层级标记
///
/// 回复节点本身的标签形如 "Reply by ... to ..."，只查祖先会漏掉未嵌套的回复。
fn is_reply(node: ElementRef<'_>) -> bool {
    std::iter::once(node)
        .chain(node.ancestors().filter_map(ElementRef::wrap))
        .filter_map(|el| el.value().attr("aria-label"))
        .any(|label| REPLY_MARKERS.iter().any(|m| label.contains(m)))
}

fn parse_node(node: ElementRef<'_>) -> Option<CapturedComment> {
    let raw = flatten_lines(node);
    let emoji = emoji_alts(node);
    if raw.is_empty() && emoji.is_empty() {
        return None;
    }

    let clean: Vec<&String> = raw.iter().filter(|l| !is_junk_line(l)).collect();
    let body = if clean.len() >= 2 {
        clean[1..]
            .iter()
            .map(|l| l.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        String::new()
    };
    let content = format!("{} {}", body, emoji).trim().to_string();

    let author = first_match(node, AUTHOR_CHAIN).unwrap_or_default();
    let likes = first_match(node, LIKE_CHAIN).unwrap_or(0);
    let timestamp = raw.iter().find(|l| is_timestamp(l)).cloned();

    Some(CapturedComment::new(
        Platform::Facebook,
        author,
        content,
        timestamp,
        likes,
    ))
}

/// 正文中以 `<img alt>` 渲染的表情
fn emoji_alts(node: ElementRef<'_>) -> String {
    let s = SiteSelectors::get();
    node.select(&s.content)
        .next()
        .map(|content| {
            content
                .select(&s.emoji)
                .filter_map(|img| img.value().attr("alt"))
                .map(str::trim)
                .filter(|alt| !alt.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default()
}

const AUTHOR_CHAIN: &[Probe<String>] = &[author_from_links];
const LIKE_CHAIN: &[Probe<u64>] = &[likes_from_aria, likes_from_buttons, likes_from_small_spans];

fn author_from_links(node: ElementRef<'_>) -> Option<String> {
    let s = SiteSelectors::get();
    node.select(&s.link)
        .filter_map(|a| a.value().attr("href"))
        .find_map(user_from_href)
}

/// 由资料页链接得到用户标识
///
/// 支持 `profile.php?id=`、`/people/<name>/<id>` 与 `/<username>` 三种形态。
pub fn user_from_href(href: &str) -> Option<String> {
    let base = Url::parse("https://www.facebook.com/").ok()?;
    let url = base.join(href).ok()?;
    let host = url.host_str()?;
    if !host.ends_with("facebook.com") || host.starts_with("l.") {
        return None;
    }

    let path = url.path();
    if REJECTED_PATHS.iter().any(|p| path.contains(p)) {
        return None;
    }

    if path.contains("profile.php") {
        return url
            .query_pairs()
            .find(|(k, _)| k == "id")
            .map(|(_, v)| v.into_owned())
            .filter(|v| !v.is_empty());
    }

    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();

    if parts.first() == Some(&"people") {
        return parts
            .iter()
            .rev()
            .find(|p| p.chars().all(|c| c.is_ascii_digit()))
            .or_else(|| parts.last().filter(|_| parts.len() >= 2))
            .map(|p| p.to_string());
    }

    let candidate = *parts.first()?;
    if SYSTEM_SEGMENTS.contains(&candidate.to_lowercase().as_str()) {
        return None;
    }
    // 短纯数字多半是帖子编号
    if candidate.chars().all(|c| c.is_ascii_digit()) && candidate.len() <= 10 {
        return None;
    }
    Some(candidate.to_string())
}

fn likes_from_aria(node: ElementRef<'_>) -> Option<u64> {
    let s = SiteSelectors::get();
    node.select(&s.aria).find_map(|el| {
        let label = el.value().attr("aria-label")?;
        let lower = label.to_lowercase();
        if !LIKE_MARKERS.iter().any(|m| lower.contains(m)) {
            return None;
        }
        FIRST_NUMBER.captures(label)?[1].parse().ok()
    })
}

fn likes_from_buttons(node: ElementRef<'_>) -> Option<u64> {
    let s = SiteSelectors::get();
    node.select(&s.button_span).find_map(|span| {
        let text = span.text().collect::<String>();
        let text = text.trim();
        (!text.is_empty() && text.len() <= 5 && text.chars().all(|c| c.is_ascii_digit()))
            .then(|| text.parse().ok())
            .flatten()
    })
}

/// 卡片末尾的小号数字；父节点含时间词的视为时间戳
fn likes_from_small_spans(node: ElementRef<'_>) -> Option<u64> {
    let s = SiteSelectors::get();
    node.select(&s.span).find_map(|span| {
        let text = span.text().collect::<String>();
        let text = text.trim();
        if text.is_empty() || text.len() > 4 || !text.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let n: u64 = text.parse().ok()?;
        if n == 0 || n >= 10_000 {
            return None;
        }
        let parent_text = span
            .parent()
            .and_then(ElementRef::wrap)
            .map(|p| format!("{} ", flatten_text(p).to_lowercase()))
            .unwrap_or_default();
        let looks_like_time = TIME_WORDS.iter().any(|w| parent_text.contains(w))
            || parent_text.lines().any(is_timestamp);
        (!looks_like_time).then_some(n)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::MEDIA_PLACEHOLDER;

    const FIXTURE: &str = r#"
<html><body>
<div role="main"><div role="article" aria-label="Post"><span>Page post outside the dialog</span></div></div>
<div role="dialog">
  <div role="article" aria-label="Comment by Alice Nguyen">
    <div><a href="https://www.facebook.com/alice.nguyen?comment_id=123"><span>Alice Nguyen</span></a></div>
    <div dir="auto">Great post <img alt="😍" src="e.png"></div>
    <ul>
      <li><a href="https://www.facebook.com/page/posts/1?comment_id=123">3h</a></li>
      <li><div role="button"><span>Like</span></div></li>
      <li><div role="button"><span>Reply</span></div></li>
    </ul>
    <div role="button" aria-label="12 reactions; see who reacted to this"><span>12</span></div>
  </div>
  <div role="article" aria-label="Reply by Bob to Alice Nguyen's comment">
    <div><a href="https://www.facebook.com/bob"><span>Bob</span></a></div>
    <div dir="auto">Agreed</div>
  </div>
  <div role="article" aria-label="Comment by Carol">
    <div><a href="/profile.php?id=100012345678&amp;comment_id=9"><span>Carol</span></a></div>
    <div dir="auto"><img alt="👍" src="t.png"></div>
    <div><span>2 ngày</span></div>
  </div>
  <div role="article" aria-label="Comment by Dan Tran">
    <div><a href="/people/Dan-Tran/100098765432/"><span>Dan Tran</span></a></div>
    <div dir="auto">Hello <a href="/hashtag/foo">#foo</a><br>world</div>
    <div role="button"><span>7</span></div>
  </div>
  <div role="article" aria-label="Comment by Eve">
    <div><a href="/eve.x"><span>Eve</span></a></div>
    <div><img src="sticker.png"></div>
    <div><span>Reply</span></div>
  </div>
  <div role="article" aria-label="Comment by Alice Nguyen">
    <div><a href="https://www.facebook.com/alice.nguyen?comment_id=456"><span>Alice Nguyen</span></a></div>
    <div dir="auto">Great post <img alt="😍" src="e.png"></div>
  </div>
</div>
</body></html>"#;

    #[test]
    fn parses_top_level_comments_in_dialog() {
        let comments = parse_comments(FIXTURE, None);
        let authors: Vec<&str> = comments.iter().map(|c| c.author.as_str()).collect();
        assert_eq!(authors, vec!["alice.nguyen", "100012345678", "100098765432", "eve.x"]);

        assert_eq!(comments[0].content, "Great post 😍");
        assert_eq!(comments[0].like_count, 12);
        assert_eq!(comments[0].timestamp_raw, "3h");

        // 只剩作者名一行：正文为空，仅保留表情
        assert_eq!(comments[1].content, "👍");
        assert_eq!(comments[1].like_count, 0);
        assert_eq!(comments[1].timestamp_raw, "2 ngày");

        assert_eq!(comments[2].content, "Hello #foo\nworld");
        assert_eq!(comments[2].like_count, 7);

        assert_eq!(comments[3].content, MEDIA_PLACEHOLDER);
        assert_eq!(comments[3].timestamp_raw, "N/A");
    }

    #[test]
    fn replies_are_skipped_by_own_or_ancestor_label() {
        let html = r#"<div role="dialog">
            <div role="article" aria-label="Comment by Ann"><div><a href="/ann.b">Ann</a></div><div dir="auto">Top</div></div>
            <div role="article" aria-label="Reply by Ben to Ann's comment"><div><a href="/ben.c">Ben</a></div><div dir="auto">Sibling reply</div></div>
            <div aria-label="2 replies">
              <div role="article" aria-label="Comment by Cat"><div><a href="/cat.d">Cat</a></div><div dir="auto">Nested reply</div></div>
            </div>
        </div>"#;
        let comments = parse_comments(html, None);
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].author, "ann.b");
    }

    #[test]
    fn falls_back_to_labelled_divs() {
        let html = r#"<div role="dialog">
            <div aria-label="Comment by Zed"><div><a href="/zed.k">Zed</a></div><div dir="auto">Hi there</div></div>
        </div>"#;
        let comments = parse_comments(html, None);
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].author, "zed.k");
        assert_eq!(comments[0].content, "Hi there");
    }

    #[test]
    fn identity_links() {
        assert_eq!(user_from_href("/alice?comment_id=1").as_deref(), Some("alice"));
        assert_eq!(
            user_from_href("https://www.facebook.com/profile.php?id=42&x=1").as_deref(),
            Some("42")
        );
        assert_eq!(user_from_href("/100012345678901").as_deref(), Some("100012345678901"));
        assert_eq!(user_from_href("/people/Some-One/").as_deref(), Some("Some-One"));

        for rejected in [
            "https://www.facebook.com/watch/?v=1",
            "/groups/123/posts/456",
            "/12345",
            "/hashtag/x",
            "https://l.facebook.com/l.php?u=x",
            "https://example.com/alice",
            "/marketplace",
            "/page/videos/99",
        ] {
            assert_eq!(user_from_href(rejected), None, "{rejected}");
        }
    }
}
