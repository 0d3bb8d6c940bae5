//! 文本工具 (Text Utilities)
//!
//! 节点文本按块级元素拆行、时间戳与界面文案识别、紧凑计数解析。

use std::sync::LazyLock;

use regex::Regex;
use scraper::ElementRef;

/// 渲染时会换行的元素
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "div", "dl", "dt", "figcaption", "figure",
    "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav",
    "ol", "p", "pre", "section", "table", "tr", "ul",
];

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg"];

#[derive(Default)]
struct LineBuffer {
    lines: Vec<String>,
    current: String,
}

impl LineBuffer {
    fn push_text(&mut self, text: &str) {
        for word in text.split_whitespace() {
            if !self.current.is_empty() && !self.current.ends_with(' ') {
                self.current.push(' ');
            }
            self.current.push_str(word);
        }
        // 文本节点间的空白分隔
        if text.ends_with(char::is_whitespace) && !self.current.is_empty() {
            self.current.push(' ');
        }
    }

    fn break_line(&mut self) {
        let line = self.current.trim();
        if !line.is_empty() {
            self.lines.push(line.to_string());
        }
        self.current.clear();
    }

    fn finish(mut self) -> Vec<String> {
        self.break_line();
        self.lines
    }
}

fn walk(el: ElementRef<'_>, buf: &mut LineBuffer) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            buf.push_text(text);
            continue;
        }
        let Some(child_el) = ElementRef::wrap(child) else {
            continue;
        };
        let name = child_el.value().name();
        if name == "br" {
            buf.break_line();
            continue;
        }
        if SKIPPED_TAGS.contains(&name) {
            continue;
        }
        let block = BLOCK_TAGS.contains(&name);
        if block {
            buf.break_line();
        }
        walk(child_el, buf);
        if block {
            buf.break_line();
        }
    }
}

/// 近似渲染后的 `innerText` 行
pub fn flatten_lines(el: ElementRef<'_>) -> Vec<String> {
    let mut buf = LineBuffer::default();
    walk(el, &mut buf);
    buf.finish()
}

/// 多行合并为一段文本
pub fn flatten_text(el: ElementRef<'_>) -> String {
    flatten_lines(el).join("\n")
}

static DATE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^\d{4}-\d{1,2}-\d{1,2}$",
        r"^\d{1,2}-\d{1,2}-\d{4}$",
        r"^\d{1,2}/\d{1,2}/\d{4}$",
        r"^\d{4}/\d{1,2}/\d{1,2}$",
        r"^\d{1,2}-\d{1,2}-\d{2}$",
        r"^\d{1,2}/\d{1,2}/\d{2}$",
        r"^\d{1,2}/\d{1,2}$",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static MONTH_DAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})-(\d{1,2})$").expect("valid regex"));

static RELATIVE_EN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\d+\s*(s|m|h|d|w|y|mo|sec|secs|min|mins|hr|hrs|second|seconds|minute|minutes|hour|hours|day|days|week|weeks|month|months|year|years)(\s+ago)?$",
    )
    .expect("valid regex")
});

static RELATIVE_VI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+\s*(giây|phút|giờ|ngày|tuần|tháng|năm)(\s+trước)?$").expect("valid regex")
});

const TIME_PHRASES: &[&str] = &[
    "just now",
    "yesterday",
    "today",
    "vừa xong",
    "hôm qua",
    "hôm nay",
];

/// 是否为时间戳文本（相对时间或日期）
///
/// 整行匹配；句子中恰好含有时间词不算。
pub fn is_timestamp(text: &str) -> bool {
    let t = text.trim();
    if t.is_empty() || t.chars().count() > 30 {
        return false;
    }
    let lower = t.to_lowercase();

    if let Some(caps) = MONTH_DAY.captures(t) {
        let month: u32 = caps[1].parse().unwrap_or(0);
        let day: u32 = caps[2].parse().unwrap_or(0);
        if (1..=12).contains(&month) && (1..=31).contains(&day) {
            return true;
        }
    }

    DATE_PATTERNS.iter().any(|re| re.is_match(t))
        || TIME_PHRASES.contains(&lower.as_str())
        || RELATIVE_EN.is_match(&lower)
        || RELATIVE_VI.is_match(&lower)
}

const JUNK_PHRASES: &[&str] = &[
    "thích",
    "trả lời",
    "phản hồi",
    "chia sẻ",
    "xem thêm",
    "viết bình luận",
    "bình luận",
    "like",
    "reply",
    "share",
    "phù hợp nhất",
    "tất cả bình luận",
    "xem bản dịch",
    "see translation",
    "theo dõi",
    "follow",
    "đang theo dõi",
    "following",
    "đã chỉnh sửa",
    "edited",
    "tác giả",
    "author",
    "top fan",
    "fan cứng",
    "most relevant",
    "all comments",
];

/// 评论卡片内的界面文案、时间戳或纯数字行
pub fn is_junk_line(text: &str) -> bool {
    let t = text.trim().to_lowercase();
    if t.is_empty() {
        return true;
    }
    JUNK_PHRASES.contains(&t.as_str())
        || t.chars().all(|c| c.is_ascii_digit())
        || is_timestamp(&t)
}

/// 紧凑计数解析：`1.2K` → 1200，`5M` → 5000000，无法解析 → 0
pub fn parse_count(text: &str) -> u64 {
    let t = text.trim().to_uppercase().replace(',', "");
    if t.is_empty() {
        return 0;
    }
    let scaled = |suffix: char, factor: f64| -> u64 {
        t.trim_end_matches(suffix)
            .trim()
            .parse::<f64>()
            .map(|v| (v * factor).round().max(0.0) as u64)
            .unwrap_or(0)
    };
    if t.ends_with('K') {
        return scaled('K', 1_000.0);
    }
    if t.ends_with('M') {
        return scaled('M', 1_000_000.0);
    }
    if t.ends_with('B') {
        return scaled('B', 1_000_000_000.0);
    }
    let digits: String = t.chars().filter(|c| c.is_ascii_digit()).collect();
    // 混杂字母的文本不是计数
    if t.chars().any(|c| c.is_alphabetic()) {
        return 0;
    }
    digits.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use scraper::{Html, Selector};

    use super::*;

    #[test]
    fn compact_numbers() {
        assert_eq!(parse_count("1.2K"), 1200);
        assert_eq!(parse_count("5M"), 5_000_000);
        assert_eq!(parse_count("123"), 123);
        assert_eq!(parse_count("1,234"), 1234);
        assert_eq!(parse_count(" 3.4k "), 3400);
        assert_eq!(parse_count(""), 0);
        assert_eq!(parse_count("garbage"), 0);
        assert_eq!(parse_count("K"), 0);
    }

    #[test]
    fn timestamps_are_recognised() {
        for t in [
            "5h",
            "2 ngày trước",
            "10/28",
            "2025-10-28",
            "28/10/2025",
            "1-13",
            "3 days ago",
            "12m",
            "1 tuần",
            "Just now",
            "Hôm qua",
        ] {
            assert!(is_timestamp(t), "{t} should be a timestamp");
        }
    }

    #[test]
    fn sentences_are_not_timestamps() {
        for t in [
            "Have a nice day",
            "Great video, watched it 5 times",
            "13-45",
            "hôm nay trời đẹp quá",
            "",
        ] {
            assert!(!is_timestamp(t), "{t} should not be a timestamp");
        }
    }

    #[test]
    fn junk_lines() {
        assert!(is_junk_line("Thích"));
        assert!(is_junk_line("Reply"));
        assert!(is_junk_line("  42 "));
        assert!(is_junk_line("3 giờ"));
        assert!(is_junk_line("Top fan"));
        assert!(!is_junk_line("Video hay quá"));
        assert!(!is_junk_line("Nguyễn Văn A"));
    }

    #[test]
    fn flattening_breaks_on_block_elements() {
        let html = Html::parse_fragment(
            r#"<div id="c"><div><a href="/u"><span>Alice</span></a></div>
               <div dir="auto">Hello <b>there</b><br>second line</div>
               <ul><li><span>Like</span></li><li>5h</li></ul>
               <script>var x = 1;</script></div>"#,
        );
        let sel = Selector::parse("#c").unwrap();
        let el = html.select(&sel).next().unwrap();
        assert_eq!(
            flatten_lines(el),
            vec!["Alice", "Hello there", "second line", "Like", "5h"]
        );
    }
}
