//! 引擎运行时上下文 (Runtime Context)
//!
//! 单次抓取调用内各策略共享的配置、节奏策略、事件与进度句柄。

use std::sync::Arc;

use crate::core::config::AppConfig;
use crate::core::event::{EventSender, HarvestEvent};
use crate::core::progress::ProgressHandle;
use crate::engine::pacing::Pacing;

/// 抓取运行时上下文
#[derive(Clone)]
pub struct RuntimeContext {
    pub config: Arc<AppConfig>,
    /// 可在测试中替换为零延迟
    pub pacing: Pacing,
    pub events: Option<EventSender>,
    pub progress: Option<ProgressHandle>,
    /// 结果条数上限
    pub max_comments: Option<usize>,
}

impl RuntimeContext {
    pub fn new(config: Arc<AppConfig>) -> Self {
        let pacing = config.pacing.clone();
        Self {
            config,
            pacing,
            events: None,
            progress: None,
            max_comments: None,
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_events(mut self, events: Option<EventSender>) -> Self {
        self.events = events;
        self
    }

    pub fn with_progress(mut self, progress: Option<ProgressHandle>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_max_comments(mut self, max: Option<usize>) -> Self {
        self.max_comments = max;
        self
    }

    /// 向事件总线推送消息
    pub fn emit(&self, event: HarvestEvent) {
        if let Some(ref sender) = self.events {
            sender.emit(event);
        }
    }

    /// 推送一条面向终端的告警
    pub fn warn(&self, message: impl Into<String>) {
        if let Some(ref sender) = self.events {
            sender.warn(message);
        }
    }

    /// 更新进度槽位
    pub fn report(&self, total: usize, message: impl Into<String>) {
        if let Some(ref progress) = self.progress {
            progress.update(total, message);
        }
    }
}
