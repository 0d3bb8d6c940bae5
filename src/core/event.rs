//! 事件系统定义
//!
//! 用于抓取引擎与终端 UI 之间的完全解耦通信

use flume::{Receiver, Sender};

use crate::core::model::Platform;

/// 抓取事件类型
#[derive(Debug, Clone)]
pub enum HarvestEvent {
    /// 任务开始
    TaskStarted { platform: Platform, url: String },

    /// 浏览器会话已就绪
    SessionLaunched { user_agent: String, mobile: bool },

    /// Cookie 注入结果
    CookiesApplied { applied: usize, missing: Vec<String> },

    /// 检测到验证码
    CaptchaDetected { headless: bool },

    /// 验证码已解除
    CaptchaCleared,

    /// 一轮滚动爆发结束
    ScrollBurst { burst: u32, moved: bool },

    /// 滚动收敛
    Converged { bursts: u32 },

    /// 接口分页进度
    PageFetched { page: u32, total: usize },

    /// 评论提取进度
    CommentsCollected { total: usize },

    /// 任务完成
    TaskCompleted { total: usize },

    /// 任务失败
    TaskFailed { error: String },

    /// 日志消息（用于 UI 显示）
    Log { level: LogLevel, message: String },
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
}

/// 事件发送器
#[derive(Clone, Debug)]
pub struct EventSender {
    tx: Sender<HarvestEvent>,
}

impl EventSender {
    pub fn new(tx: Sender<HarvestEvent>) -> Self {
        Self { tx }
    }

    /// 发送事件
    pub fn emit(&self, event: HarvestEvent) {
        let _ = self.tx.send(event);
    }

    /// 发送日志事件
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(HarvestEvent::Log {
            level,
            message: message.into(),
        });
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }
}

/// 事件接收器
pub struct EventReceiver {
    rx: Receiver<HarvestEvent>,
}

impl EventReceiver {
    pub fn new(rx: Receiver<HarvestEvent>) -> Self {
        Self { rx }
    }

    /// 非阻塞接收事件
    pub fn try_recv(&self) -> Option<HarvestEvent> {
        self.rx.try_recv().ok()
    }

    /// 异步接收事件
    pub async fn recv_async(&self) -> Option<HarvestEvent> {
        self.rx.recv_async().await.ok()
    }
}

/// 创建事件通道
pub fn create_event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = flume::unbounded();
    (EventSender::new(tx), EventReceiver::new(rx))
}
