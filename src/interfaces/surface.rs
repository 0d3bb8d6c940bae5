//! 页面能力接口 (Page Capabilities)
//!
//! 验证码哨兵与滚动引擎只依赖这两个窄接口，真实实现见 `network::page`，测试中以内存假体替代。

use async_trait::async_trait;
use serde::Deserialize;

use crate::core::error::Result;

/// 验证码探针
#[async_trait]
pub trait ChallengeProbe: Send + Sync {
    /// 当前是否存在可见的验证控件
    async fn challenge_visible(&self) -> Result<bool>;
}

/// 滚动度量
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct ScrollState {
    /// 当前滚动偏移
    pub offset: f64,
    /// 可滚动内容总高度
    pub extent: f64,
    /// 可视高度
    pub viewport: f64,
}

impl ScrollState {
    /// 相对 `before` 是否有任一信号增长
    pub fn advanced_from(&self, before: &ScrollState) -> bool {
        self.offset > before.offset || self.extent > before.extent
    }
}

/// 可滚动目标（文档主体或评论容器）
#[async_trait]
pub trait ScrollSurface: Send + Sync {
    /// 确认滚动目标仍有效，必要时重新定位
    async fn ensure_target(&self) -> Result<()> {
        Ok(())
    }

    async fn measure(&self) -> Result<ScrollState>;

    /// 一个小步滚动
    async fn step(&self) -> Result<()>;

    /// 回滚若干像素
    async fn nudge_back(&self, px: i64) -> Result<()>;

    /// 直达底部
    async fn to_end(&self) -> Result<()>;

    /// 展开“查看更多”一类的按钮，返回点击次数
    async fn reveal_more(&self) -> Result<usize> {
        Ok(0)
    }
}
