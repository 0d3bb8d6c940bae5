//! 拟人化节奏策略 (Human Pacing Policy)
//!
//! 所有等待都经由此处，测试中替换为零延迟策略。

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

/// 毫秒区间，闭区间均匀取值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const ZERO: DelayRange = DelayRange { min_ms: 0, max_ms: 0 };

    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub const fn fixed(ms: u64) -> Self {
        Self { min_ms: ms, max_ms: ms }
    }

    /// 采样一次延迟
    pub fn sample(&self) -> Duration {
        let (lo, hi) = if self.min_ms <= self.max_ms {
            (self.min_ms, self.max_ms)
        } else {
            (self.max_ms, self.min_ms)
        };
        if lo == hi {
            return Duration::from_millis(lo);
        }
        Duration::from_millis(rand::rng().random_range(lo..=hi))
    }
}

/// 各类动作的延迟区间
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Pacing {
    /// 单步滚动之间
    pub scroll_step: DelayRange,
    /// 纠偏滚动前后
    pub corrective: DelayRange,
    /// 页面导航后
    pub page_load: DelayRange,
    /// 点击、切换等轻量交互后
    pub settle: DelayRange,
    /// 接口翻页之间
    pub api_page: DelayRange,
    /// 注入 Cookie 前后的预热
    pub cookie_warmup: DelayRange,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            scroll_step: DelayRange::fixed(60),
            corrective: DelayRange::new(500, 1000),
            page_load: DelayRange::new(3000, 5000),
            settle: DelayRange::new(1000, 2000),
            api_page: DelayRange::new(500, 1500),
            cookie_warmup: DelayRange::new(2000, 3000),
        }
    }
}

impl Pacing {
    /// 零延迟策略
    pub fn instant() -> Self {
        Self {
            scroll_step: DelayRange::ZERO,
            corrective: DelayRange::ZERO,
            page_load: DelayRange::ZERO,
            settle: DelayRange::ZERO,
            api_page: DelayRange::ZERO,
            cookie_warmup: DelayRange::ZERO,
        }
    }

    pub async fn pause(&self, range: DelayRange) {
        let delay = range.sample();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_stay_within_bounds() {
        let range = DelayRange::new(500, 1500);
        for _ in 0..200 {
            let d = range.sample().as_millis() as u64;
            assert!((500..=1500).contains(&d));
        }
        let swapped = DelayRange::new(9, 3).sample().as_millis();
        assert!((3..=9).contains(&swapped));
    }

    #[tokio::test(start_paused = true)]
    async fn instant_policy_never_advances_the_clock() {
        let pacing = Pacing::instant();
        let start = tokio::time::Instant::now();
        pacing.pause(pacing.page_load).await;
        pacing.pause(pacing.api_page).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
