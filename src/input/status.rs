use crate::core::{Micros, PlaybackState, RATE_DEFAULT};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

/// 对外发布的状态变量
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub state: PlaybackState,
    /// 0.0 - 1.0
    pub position: f64,
    pub time: Micros,
    pub length: Micros,
    pub rate: i32,
    pub title: usize,
    pub seekpoint: usize,
    pub title_count: usize,
    pub seekpoint_count: usize,
    /// 输入码率（bit/s）
    pub bit_rate: u64,
    pub sample_rate: u32,
    pub seekable: bool,
    pub can_pause: bool,
    pub can_rate: bool,
    pub eof: bool,
    pub program: i32,
    pub audio_delay: Micros,
    pub spu_delay: Micros,
    pub pts_delay: Micros,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            state: PlaybackState::Initializing,
            position: 0.0,
            time: 0,
            length: 0,
            rate: RATE_DEFAULT,
            title: 0,
            seekpoint: 0,
            title_count: 0,
            seekpoint_count: 0,
            bit_rate: 0,
            sample_rate: 0,
            seekable: false,
            can_pause: false,
            can_rate: false,
            eof: false,
            program: 0,
            audio_delay: 0,
            spu_delay: 0,
            pts_delay: 0,
        }
    }
}

/// 状态通知
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    /// 播放状态变化
    State(PlaybackState),
    /// 任意状态变量变化，附带完整快照
    Changed(StatusSnapshot),
}

/// 状态看板：输入线程写，外部线程读/订阅
pub struct StatusBoard {
    current: RwLock<StatusSnapshot>,
    subscribers: Mutex<Vec<Sender<StatusEvent>>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(StatusSnapshot::default()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.current.read().clone()
    }

    pub fn state(&self) -> PlaybackState {
        self.current.read().state
    }

    pub fn subscribe(&self) -> Receiver<StatusEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// 发布新快照，有变化时通知订阅者；返回是否有变化
    pub fn publish(&self, next: StatusSnapshot) -> bool {
        let previous = {
            let mut current = self.current.write();
            if *current == next {
                return false;
            }
            std::mem::replace(&mut *current, next.clone())
        };

        let mut events = Vec::with_capacity(2);
        if previous.state != next.state {
            events.push(StatusEvent::State(next.state));
        }
        events.push(StatusEvent::Changed(next));

        // 已断开的订阅者顺便清掉
        self.subscribers
            .lock()
            .retain(|tx| events.iter().all(|e| tx.send(e.clone()).is_ok()));
        true
    }

    /// 只改状态并立即发布
    pub fn set_state(&self, state: PlaybackState) -> bool {
        let mut next = self.snapshot();
        next.state = state;
        self.publish(next)
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_notifies_only_on_change() {
        let board = StatusBoard::new();
        let rx = board.subscribe();

        let mut snapshot = board.snapshot();
        snapshot.time = 5;
        assert!(board.publish(snapshot.clone()));
        assert!(!board.publish(snapshot));

        assert!(matches!(rx.try_recv(), Ok(StatusEvent::Changed(s)) if s.time == 5));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_state_change_sends_state_event_first() {
        let board = StatusBoard::new();
        let rx = board.subscribe();
        board.set_state(PlaybackState::Opening);
        assert_eq!(rx.try_recv().unwrap(), StatusEvent::State(PlaybackState::Opening));
        assert!(matches!(rx.try_recv(), Ok(StatusEvent::Changed(_))));
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let board = StatusBoard::new();
        drop(board.subscribe());
        board.set_state(PlaybackState::Playing);
        assert!(board.subscribers.lock().is_empty());
    }
}
