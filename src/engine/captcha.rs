//! 验证码哨兵 (Captcha Sentinel)
//!
//! 状态流转：`Absent → Present → {Resolved, Aborted}`。
//! 无头模式下一旦出现验证码立即中止；有头模式下按固定间隔轮询，等待人工处理直至上限。

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::core::config::CaptchaConfig;
use crate::core::error::{CaptchaCause, HarvestError, Result};
use crate::core::event::{EventSender, HarvestEvent, LogLevel};
use crate::core::model::Platform;
use crate::interfaces::ChallengeProbe;

/// 单次探测结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptchaState {
    Absent,
    Present,
}

/// 哨兵裁决
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// 未出现验证码
    Absent,
    /// 人工处理后已解除
    Resolved,
}

pub struct CaptchaSentinel {
    platform: Platform,
    headless: bool,
    policy: CaptchaConfig,
    events: Option<EventSender>,
}

impl CaptchaSentinel {
    pub fn new(platform: Platform, headless: bool, policy: CaptchaConfig) -> Self {
        Self {
            platform,
            headless,
            policy,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Option<EventSender>) -> Self {
        self.events = events;
        self
    }

    pub fn headless(&self) -> bool {
        self.headless
    }

    /// 探测一次；探针故障按未出现处理
    pub async fn state(&self, probe: &dyn ChallengeProbe) -> CaptchaState {
        match probe.challenge_visible().await {
            Ok(true) => CaptchaState::Present,
            Ok(false) => CaptchaState::Absent,
            Err(e) => {
                debug!("验证码探测失败，按未出现处理: {}", e);
                CaptchaState::Absent
            }
        }
    }

    /// 检查并按模式策略处理验证码
    pub async fn guard(&self, probe: &dyn ChallengeProbe) -> Result<Verdict> {
        if self.state(probe).await == CaptchaState::Absent {
            return Ok(Verdict::Absent);
        }

        self.emit(HarvestEvent::CaptchaDetected {
            headless: self.headless,
        });

        if self.headless {
            warn!("无头模式下检测到 {} 验证码，立即中止", self.platform);
            return Err(HarvestError::CaptchaDetected(CaptchaCause::Headless {
                guidance: self.platform.captcha_guidance().to_string(),
            }));
        }

        self.wait_for_human(probe).await
    }

    /// 误报容忍：等待宽限期后复查，消失则视为瞬时误报
    ///
    /// 仅当宽限期开启时生效；返回 `true` 表示验证码已不在。
    pub async fn recheck_after_grace(&self, probe: &dyn ChallengeProbe) -> bool {
        let Some(grace) = self.policy.transient_grace() else {
            return false;
        };
        debug!("检测到疑似验证码，{}s 后复查", grace.as_secs());
        tokio::time::sleep(grace).await;
        let vanished = self.state(probe).await == CaptchaState::Absent;
        if vanished {
            info!("验证码已自行消失，按误报处理");
            if let Some(events) = &self.events {
                events.log(LogLevel::Info, "captcha vanished on recheck, treated as transient");
            }
        }
        vanished
    }

    pub fn tolerates_transients(&self) -> bool {
        self.policy.transient_grace().is_some()
    }

    async fn wait_for_human(&self, probe: &dyn ChallengeProbe) -> Result<Verdict> {
        let ceiling = self.policy.ceiling();
        let interval = self.policy.poll_interval();
        let heartbeat = Duration::from_secs(self.policy.heartbeat_secs.max(1));

        info!(
            "检测到 {} 验证码，请在浏览器窗口中手动完成（最长等待 {}s）",
            self.platform,
            ceiling.as_secs()
        );

        let started = Instant::now();
        let mut last_beat = started;

        while started.elapsed() < ceiling {
            tokio::time::sleep(interval).await;

            if self.state(probe).await == CaptchaState::Absent {
                info!("验证码已解除，耗时 {}s", started.elapsed().as_secs());
                tokio::time::sleep(Duration::from_secs(self.policy.settle_secs)).await;
                self.emit(HarvestEvent::CaptchaCleared);
                return Ok(Verdict::Resolved);
            }

            if last_beat.elapsed() >= heartbeat {
                last_beat = Instant::now();
                info!(
                    "仍在等待验证码处理... {}s/{}s",
                    started.elapsed().as_secs(),
                    ceiling.as_secs()
                );
            }
        }

        let waited_secs = started.elapsed().as_secs();
        warn!("验证码等待超时 ({}s)", waited_secs);
        Err(HarvestError::CaptchaDetected(CaptchaCause::TimedOut { waited_secs }))
    }

    fn emit(&self, event: HarvestEvent) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }
}
