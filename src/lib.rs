//! 评论采集引擎 (Comment Harvester)
//!
//! 从 TikTok 与 Facebook 抓取一级评论：驱动浏览器渲染并滚动到收敛后解析 DOM，
//! 或携带会话 Cookie 直连 TikTok 评论接口。

pub mod actors;
pub mod core;
pub mod engine;
pub mod extract;
pub mod fingerprint;
pub mod interfaces;
pub mod network;
pub mod sites;
pub mod ui;

pub use crate::core::error::{FailureKind, HarvestError, Result};
pub use crate::core::model::{CapturedComment, Platform, StrategyMode};
pub use crate::engine::{Harvester, ScrapeRequest};
