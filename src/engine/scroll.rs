//! 滚动收敛引擎 (Scroll-Convergence Engine)
//!
//! 以小步连续滚动组成一次“爆发”，用滚动偏移与内容高度两路信号判断是否仍有新内容。
//! 失败的爆发先做一次回滚再触底的纠偏，仍无增长才计入连续失败；任一成功清零计数。

use tracing::{debug, info};

use crate::core::config::ScrollConfig;
use crate::core::error::Result;
use crate::core::event::{EventSender, HarvestEvent};
use crate::engine::captcha::CaptchaSentinel;
use crate::engine::pacing::Pacing;
use crate::interfaces::{ChallengeProbe, ScrollSurface};

/// 收敛原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// 连续失败达到阈值
    Converged,
    /// 触及爆发次数硬上限
    BurstCap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergenceReport {
    pub bursts: u32,
    pub successful: u32,
    pub reason: StopReason,
}

/// 滚动过程中的验证码巡检
pub struct ChallengeWatch<'a> {
    pub sentinel: &'a CaptchaSentinel,
    pub probe: &'a dyn ChallengeProbe,
}

pub struct ConvergenceEngine<'a> {
    config: &'a ScrollConfig,
    pacing: &'a Pacing,
    events: Option<&'a EventSender>,
}

impl<'a> ConvergenceEngine<'a> {
    pub fn new(config: &'a ScrollConfig, pacing: &'a Pacing) -> Self {
        Self {
            config,
            pacing,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Option<&'a EventSender>) -> Self {
        self.events = events;
        self
    }

    /// 持续滚动直至收敛
    ///
    /// 验证码在每轮爆发前巡检，哨兵的失败直接向上传播。
    pub async fn run(
        &self,
        surface: &dyn ScrollSurface,
        watch: Option<&ChallengeWatch<'_>>,
    ) -> Result<ConvergenceReport> {
        let max_failed = self.config.max_failed_bursts.max(1);
        let mut failed_streak = 0u32;
        let mut bursts = 0u32;
        let mut successful = 0u32;

        while bursts < self.config.max_bursts {
            if let Some(w) = watch {
                w.sentinel.guard(w.probe).await?;
            }

            surface.ensure_target().await?;
            bursts += 1;

            let moved = self.burst(surface).await?;
            self.emit(HarvestEvent::ScrollBurst { burst: bursts, moved });

            if moved {
                successful += 1;
                failed_streak = 0;
                continue;
            }

            failed_streak += 1;
            debug!("第 {} 轮滚动无增长 (连续 {}/{})", bursts, failed_streak, max_failed);
            if failed_streak >= max_failed {
                info!("滚动已收敛: {} 轮爆发，{} 轮有效", bursts, successful);
                self.emit(HarvestEvent::Converged { bursts });
                return Ok(ConvergenceReport {
                    bursts,
                    successful,
                    reason: StopReason::Converged,
                });
            }
        }

        info!("达到滚动爆发上限 ({})，停止滚动", self.config.max_bursts);
        self.emit(HarvestEvent::Converged { bursts });
        Ok(ConvergenceReport {
            bursts,
            successful,
            reason: StopReason::BurstCap,
        })
    }

    /// 一轮爆发；无增长时纠偏后复测
    async fn burst(&self, surface: &dyn ScrollSurface) -> Result<bool> {
        let before = surface.measure().await?;

        let revealed = surface.reveal_more().await?;
        if revealed > 0 {
            debug!("展开了 {} 个“查看更多”按钮", revealed);
        }

        for _ in 0..self.config.burst_steps.max(1) {
            surface.step().await?;
            self.pacing.pause(self.pacing.scroll_step).await;
        }

        let after = surface.measure().await?;
        if after.advanced_from(&before) {
            return Ok(true);
        }

        // 部分无限滚动实现需要一次偏移跳变才会触发加载
        surface.nudge_back(self.config.corrective_back_px).await?;
        self.pacing.pause(self.pacing.corrective).await;
        surface.to_end().await?;
        self.pacing.pause(self.pacing.corrective).await;

        let corrected = surface.measure().await?;
        Ok(corrected.advanced_from(&before))
    }

    fn emit(&self, event: HarvestEvent) {
        if let Some(events) = self.events {
            events.emit(event);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::core::config::CaptchaConfig;
    use crate::core::error::{CaptchaCause, HarvestError};
    use crate::core::model::Platform;
    use crate::engine::captcha::tests::ScriptedProbe;
    use crate::interfaces::ScrollState;

    /// 模拟一个有限长度的信息流：每次滚动到底会追加一页，直到页数耗尽
    pub(crate) struct FeedSurface {
        state: Mutex<ScrollState>,
        pages_left: AtomicU32,
        page_height: f64,
        pub steps: AtomicU32,
        pub corrections: AtomicU32,
    }

    impl FeedSurface {
        pub(crate) fn new(pages: u32) -> Self {
            Self {
                state: Mutex::new(ScrollState {
                    offset: 0.0,
                    extent: 2000.0,
                    viewport: 800.0,
                }),
                pages_left: AtomicU32::new(pages),
                page_height: 1500.0,
                steps: AtomicU32::new(0),
                corrections: AtomicU32::new(0),
            }
        }

        fn scroll_to(&self, target: f64) {
            let mut s = self.state.lock();
            let max = (s.extent - s.viewport).max(0.0);
            s.offset = target.clamp(0.0, max);
            if s.offset >= max && self.pages_left.load(Ordering::SeqCst) > 0 {
                self.pages_left.fetch_sub(1, Ordering::SeqCst);
                s.extent += self.page_height;
            }
        }
    }

    #[async_trait]
    impl ScrollSurface for FeedSurface {
        async fn measure(&self) -> Result<ScrollState> {
            Ok(*self.state.lock())
        }

        async fn step(&self) -> Result<()> {
            self.steps.fetch_add(1, Ordering::SeqCst);
            let offset = self.state.lock().offset;
            self.scroll_to(offset + 100.0);
            Ok(())
        }

        async fn nudge_back(&self, px: i64) -> Result<()> {
            self.corrections.fetch_add(1, Ordering::SeqCst);
            let offset = self.state.lock().offset;
            self.scroll_to(offset - px as f64);
            Ok(())
        }

        async fn to_end(&self) -> Result<()> {
            let extent = self.state.lock().extent;
            self.scroll_to(extent);
            Ok(())
        }
    }

    /// 每加载一页就丢失滚动容器，直到下一轮爆发前重新定位；脱离期间的滚动无效
    struct DetachingFeed {
        feed: FeedSurface,
        detached: AtomicBool,
        relocations: AtomicU32,
    }

    impl DetachingFeed {
        fn new(pages: u32) -> Self {
            Self {
                feed: FeedSurface::new(pages),
                detached: AtomicBool::new(false),
                relocations: AtomicU32::new(0),
            }
        }

        /// 脱离时返回 `None`，否则返回滚动前剩余页数
        fn attached(&self) -> Option<u32> {
            (!self.detached.load(Ordering::SeqCst)).then(|| self.feed.pages_left.load(Ordering::SeqCst))
        }

        fn settle(&self, pages_before: u32) {
            if self.feed.pages_left.load(Ordering::SeqCst) < pages_before {
                self.detached.store(true, Ordering::SeqCst);
            }
        }
    }

    #[async_trait]
    impl ScrollSurface for DetachingFeed {
        async fn ensure_target(&self) -> Result<()> {
            if self.detached.swap(false, Ordering::SeqCst) {
                self.relocations.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }

        async fn measure(&self) -> Result<ScrollState> {
            self.feed.measure().await
        }

        async fn step(&self) -> Result<()> {
            let Some(pages) = self.attached() else {
                return Ok(());
            };
            self.feed.step().await?;
            self.settle(pages);
            Ok(())
        }

        async fn nudge_back(&self, px: i64) -> Result<()> {
            let Some(pages) = self.attached() else {
                return Ok(());
            };
            self.feed.nudge_back(px).await?;
            self.settle(pages);
            Ok(())
        }

        async fn to_end(&self) -> Result<()> {
            let Some(pages) = self.attached() else {
                return Ok(());
            };
            self.feed.to_end().await?;
            self.settle(pages);
            Ok(())
        }
    }

    fn config() -> ScrollConfig {
        ScrollConfig::default()
    }

    #[tokio::test]
    async fn stalled_surface_converges_after_three_corrected_failures() {
        let surface = FeedSurface::new(0);
        // 先滚到底，使后续爆发全部失败
        surface.to_end().await.unwrap();

        let cfg = config();
        let pacing = Pacing::instant();
        let report = ConvergenceEngine::new(&cfg, &pacing)
            .run(&surface, None)
            .await
            .unwrap();

        assert_eq!(report.reason, StopReason::Converged);
        assert_eq!(report.bursts, 3);
        assert_eq!(report.successful, 0);
        assert_eq!(surface.corrections.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn growing_feed_resets_failure_streak() {
        let surface = FeedSurface::new(5);
        let cfg = config();
        let pacing = Pacing::instant();

        let report = ConvergenceEngine::new(&cfg, &pacing)
            .run(&surface, None)
            .await
            .unwrap();

        assert_eq!(report.reason, StopReason::Converged);
        assert!(report.successful >= 5);
        assert_eq!(report.bursts, report.successful + 3);
        assert_eq!(surface.pages_left.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn replaced_container_is_relocated_before_each_burst() {
        let surface = DetachingFeed::new(5);
        let cfg = config();
        let pacing = Pacing::instant();

        let report = ConvergenceEngine::new(&cfg, &pacing)
            .run(&surface, None)
            .await
            .unwrap();

        assert_eq!(report.reason, StopReason::Converged);
        assert!(report.successful >= 5);
        assert_eq!(report.bursts, report.successful + 3);
        assert_eq!(surface.relocations.load(Ordering::SeqCst), 5);
        assert_eq!(surface.feed.pages_left.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn burst_cap_bounds_endless_feeds() {
        let surface = FeedSurface::new(u32::MAX);
        let cfg = ScrollConfig::builder().max_bursts(7).build();
        let pacing = Pacing::instant();

        let report = ConvergenceEngine::new(&cfg, &pacing)
            .run(&surface, None)
            .await
            .unwrap();

        assert_eq!(report.reason, StopReason::BurstCap);
        assert_eq!(report.bursts, 7);
        assert_eq!(surface.steps.load(Ordering::SeqCst), 7 * 15);
    }

    #[tokio::test(start_paused = true)]
    async fn captcha_mid_scroll_aborts_headless_run() {
        let surface = FeedSurface::new(3);
        let cfg = config();
        let pacing = Pacing::instant();
        let sentinel = CaptchaSentinel::new(Platform::TikTok, true, CaptchaConfig::default());
        let probe = ScriptedProbe::new(usize::MAX);
        let watch = ChallengeWatch {
            sentinel: &sentinel,
            probe: &probe,
        };

        let err = ConvergenceEngine::new(&cfg, &pacing)
            .run(&surface, Some(&watch))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            HarvestError::CaptchaDetected(CaptchaCause::Headless { .. })
        ));
        assert_eq!(surface.steps.load(Ordering::SeqCst), 0);
    }
}
