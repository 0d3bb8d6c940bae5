//! 进度看板 (Progress Board)
//!
//! 按调用方身份分槽存储进度，并发写入互不干扰；同一键的后写覆盖先写。

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::core::event::{EventSender, HarvestEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Running,
    Done,
}

/// 单个调用方的进度快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    #[serde(rename = "total")]
    pub total_so_far: usize,
    pub status: ProgressStatus,
    pub message: String,
}

/// 并发进度映射
#[derive(Clone, Default)]
pub struct ProgressBoard {
    slots: Arc<RwLock<HashMap<String, Progress>>>,
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为某个调用方签发进度句柄
    pub fn handle(&self, caller: impl Into<String>) -> ProgressHandle {
        ProgressHandle {
            board: self.clone(),
            caller: caller.into(),
            events: None,
        }
    }

    pub fn get(&self, caller: &str) -> Option<Progress> {
        self.slots.read().get(caller).cloned()
    }

    fn put(&self, caller: &str, progress: Progress) {
        self.slots.write().insert(caller.to_string(), progress);
    }
}

/// 单次调用持有的进度句柄
#[derive(Clone)]
pub struct ProgressHandle {
    board: ProgressBoard,
    caller: String,
    events: Option<EventSender>,
}

impl ProgressHandle {
    /// 同步镜像到 UI 事件通道
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn caller(&self) -> &str {
        &self.caller
    }

    pub fn update(&self, total_so_far: usize, message: impl Into<String>) {
        self.write(total_so_far, ProgressStatus::Running, message.into());
        if let Some(events) = &self.events {
            events.emit(HarvestEvent::CommentsCollected { total: total_so_far });
        }
    }

    pub fn finish(&self, total: usize, message: impl Into<String>) {
        self.write(total, ProgressStatus::Done, message.into());
    }

    fn write(&self, total_so_far: usize, status: ProgressStatus, message: String) {
        self.board.put(
            &self.caller,
            Progress {
                total_so_far,
                status,
                message,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_caller_owns_a_slot() {
        let board = ProgressBoard::new();
        let a = board.handle("alice");
        let b = board.handle("bob");

        a.update(10, "scrolling");
        b.update(3, "fetching");
        a.finish(42, "done");

        let pa = board.get("alice").unwrap();
        assert_eq!(pa.total_so_far, 42);
        assert_eq!(pa.status, ProgressStatus::Done);
        assert_eq!(board.get("bob").unwrap().total_so_far, 3);
        assert!(board.get("carol").is_none());
    }

    #[test]
    fn concurrent_writers_do_not_corrupt_each_other() {
        let board = ProgressBoard::new();
        let workers: Vec<_> = (0..8)
            .map(|i| {
                let handle = board.handle(format!("caller-{}", i));
                std::thread::spawn(move || {
                    for n in 0..=100 {
                        handle.update(n, "tick");
                    }
                    handle.finish(100 + i, "done");
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        for i in 0..8 {
            let p = board.get(&format!("caller-{}", i)).unwrap();
            assert_eq!(p.total_so_far, 100 + i);
            assert_eq!(p.status, ProgressStatus::Done);
        }
    }
}
