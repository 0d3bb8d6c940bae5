//! TikTok 评论解析

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html};
use tracing::debug;

use crate::core::model::{CapturedComment, Platform};
use crate::extract::text::{flatten_lines, is_timestamp, parse_count};
use crate::extract::{CommentBook, Probe, first_match};

use super::selectors::SiteSelectors;

static ARIA_LIKES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([\d.,]+[km]?)\s*like").expect("valid regex"));

/// 从页面快照中解析一级评论
pub fn parse_comments(html: &str, limit: Option<usize>) -> Vec<CapturedComment> {
    let doc = Html::parse_document(html);
    let s = SiteSelectors::get();

    let nodes: Vec<ElementRef<'_>> = s
        .comment_nodes
        .iter()
        .map(|sel| doc.select(sel).collect::<Vec<_>>())
        .find(|found| !found.is_empty())
        .unwrap_or_default();
    debug!("TikTok 候选评论节点 {} 个", nodes.len());

    let mut book = CommentBook::with_limit(limit);
    for node in nodes {
        if book.is_full() {
            break;
        }
        if let Some(comment) = parse_node(node) {
            book.insert(comment);
        }
    }
    book.into_vec()
}

fn parse_node(node: ElementRef<'_>) -> Option<CapturedComment> {
    let s = SiteSelectors::get();
    let lines: Vec<String> = flatten_lines(node)
        .into_iter()
        .filter(|l| !is_timestamp(l))
        .collect();
    // 纯贴图评论保留为占位，空节点丢弃
    if lines.is_empty() && node.select(&s.image).next().is_none() {
        return None;
    }

    let author = first_match(node, AUTHOR_CHAIN).unwrap_or_default();
    let likes = first_match(node, LIKE_CHAIN).unwrap_or(0);
    let timestamp = first_match(node, TIME_CHAIN);

    Some(CapturedComment::new(
        Platform::TikTok,
        author,
        lines.join("\n"),
        timestamp,
        likes,
    ))
}

const AUTHOR_CHAIN: &[Probe<String>] = &[author_in_item, author_in_ancestors];
const LIKE_CHAIN: &[Probe<u64>] = &[likes_from_aria, likes_from_count_nodes];
const TIME_CHAIN: &[Probe<String>] = &[time_from_marker, time_from_spans];

/// `@name` 形式的作者标识
pub fn user_from_href(href: &str) -> Option<String> {
    let (_, rest) = href.split_once('@')?;
    let name = rest.split(['/', '?', '#']).next()?.trim();
    (!name.is_empty()).then(|| format!("@{}", name))
}

fn ancestors(el: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    el.ancestors().filter_map(ElementRef::wrap)
}

/// 评论条目容器；找不到时取向上第三层
fn item_container(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    let s = SiteSelectors::get();
    ancestors(el)
        .find(|a| s.item_container.matches(a))
        .or_else(|| ancestors(el).nth(2))
}

fn author_in_item(el: ElementRef<'_>) -> Option<String> {
    let s = SiteSelectors::get();
    let item = item_container(el)?;
    item.select(&s.profile_link)
        .filter_map(|a| a.value().attr("href"))
        .find_map(user_from_href)
}

/// 逐层向上找作者链接，不越过评论条目边界
fn author_in_ancestors(el: ElementRef<'_>) -> Option<String> {
    let s = SiteSelectors::get();
    for a in ancestors(el).take(4) {
        let found = a
            .select(&s.profile_link)
            .filter_map(|link| link.value().attr("href"))
            .find_map(user_from_href);
        if found.is_some() {
            return found;
        }
        if s.item_container.matches(&a) {
            break;
        }
    }
    None
}

/// 点赞数的搜索范围：父、祖父、评论条目
fn like_contexts(el: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let mut contexts: Vec<ElementRef<'_>> = ancestors(el).take(2).collect();
    if let Some(item) = item_container(el)
        && !contexts.iter().any(|c| c.id() == item.id())
    {
        contexts.push(item);
    }
    contexts
}

fn likes_from_aria(el: ElementRef<'_>) -> Option<u64> {
    let s = SiteSelectors::get();
    like_contexts(el).into_iter().find_map(|ctx| {
        ctx.select(&s.aria_like).find_map(|node| {
            let label = node.value().attr("aria-label")?;
            let caps = ARIA_LIKES.captures(label)?;
            Some(parse_count(&caps[1]))
        })
    })
}

fn likes_from_count_nodes(el: ElementRef<'_>) -> Option<u64> {
    let s = SiteSelectors::get();
    like_contexts(el).into_iter().find_map(|ctx| {
        s.like_count.iter().find_map(|sel| {
            ctx.select(sel)
                .map(|n| n.text().collect::<String>())
                // "3-15" 一类日期会被读成数字
                .filter(|t| !is_timestamp(t))
                .map(|t| parse_count(&t))
                .find(|&n| n > 0)
        })
    })
}

fn time_from_marker(el: ElementRef<'_>) -> Option<String> {
    let s = SiteSelectors::get();
    let item = item_container(el)?;
    item.select(&s.time)
        .map(|t| t.text().collect::<String>().trim().to_string())
        .find(|t| !t.is_empty())
}

fn time_from_spans(el: ElementRef<'_>) -> Option<String> {
    let s = SiteSelectors::get();
    let item = item_container(el)?;
    item.select(&s.span)
        .map(|t| t.text().collect::<String>().trim().to_string())
        .find(|t| is_timestamp(t))
}
