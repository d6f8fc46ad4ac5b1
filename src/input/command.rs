use crate::core::{log_ctx, Micros, PlayerError, RequestedState, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::warn;
use std::time::Duration;

/// 控制队列最多容纳的待处理命令数
pub const CONTROL_QUEUE_CAPACITY: usize = 100;

/// 输入线程命令
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Die,
    SetPosition(f64),
    SetPositionOffset(f64),
    SetTime(Micros),
    SetTimeOffset(Micros),
    SetState(RequestedState),
    SetRate(i32),
    SetRateSlower,
    SetRateFaster,
    SetProgram(i32),
    SetEs(i32),
    SetAudioDelay(Micros),
    SetSpuDelay(Micros),
    SetTitle(usize),
    SetTitleNext,
    SetTitlePrev,
    SetSeekpoint(usize),
    SetSeekpointNext,
    SetSeekpointPrev,
    AddSlave(String),
    SetBookmark(usize),
}

/// 命令种类（不带参数）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Die,
    SetPosition,
    SetPositionOffset,
    SetTime,
    SetTimeOffset,
    SetState,
    SetRate,
    SetRateSlower,
    SetRateFaster,
    SetProgram,
    SetEs,
    SetAudioDelay,
    SetSpuDelay,
    SetTitle,
    SetTitleNext,
    SetTitlePrev,
    SetSeekpoint,
    SetSeekpointNext,
    SetSeekpointPrev,
    AddSlave,
    SetBookmark,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Die => CommandKind::Die,
            Command::SetPosition(_) => CommandKind::SetPosition,
            Command::SetPositionOffset(_) => CommandKind::SetPositionOffset,
            Command::SetTime(_) => CommandKind::SetTime,
            Command::SetTimeOffset(_) => CommandKind::SetTimeOffset,
            Command::SetState(_) => CommandKind::SetState,
            Command::SetRate(_) => CommandKind::SetRate,
            Command::SetRateSlower => CommandKind::SetRateSlower,
            Command::SetRateFaster => CommandKind::SetRateFaster,
            Command::SetProgram(_) => CommandKind::SetProgram,
            Command::SetEs(_) => CommandKind::SetEs,
            Command::SetAudioDelay(_) => CommandKind::SetAudioDelay,
            Command::SetSpuDelay(_) => CommandKind::SetSpuDelay,
            Command::SetTitle(_) => CommandKind::SetTitle,
            Command::SetTitleNext => CommandKind::SetTitleNext,
            Command::SetTitlePrev => CommandKind::SetTitlePrev,
            Command::SetSeekpoint(_) => CommandKind::SetSeekpoint,
            Command::SetSeekpointNext => CommandKind::SetSeekpointNext,
            Command::SetSeekpointPrev => CommandKind::SetSeekpointPrev,
            Command::AddSlave(_) => CommandKind::AddSlave,
            Command::SetBookmark(_) => CommandKind::SetBookmark,
        }
    }
}

impl CommandKind {
    /// 描述目标状态（而非增量）的命令，连续出现时只保留最后一个
    pub fn is_coalescible(self) -> bool {
        matches!(
            self,
            CommandKind::SetState
                | CommandKind::SetRate
                | CommandKind::SetPosition
                | CommandKind::SetTime
                | CommandKind::SetProgram
                | CommandKind::SetTitle
                | CommandKind::SetSeekpoint
                | CommandKind::SetBookmark
        )
    }
}

/// 合并连续的同类可覆盖命令，其余顺序不变
pub fn reduce(commands: Vec<Command>) -> Vec<Command> {
    let mut reduced: Vec<Command> = Vec::with_capacity(commands.len());
    for command in commands {
        let kind = command.kind();
        match reduced.last_mut() {
            Some(last) if kind.is_coalescible() && last.kind() == kind => *last = command,
            _ => reduced.push(command),
        }
    }
    reduced
}

/// 生产者端，可任意克隆到其他线程
#[derive(Clone)]
pub struct CommandSender {
    tx: Sender<Command>,
    label: String,
}

impl CommandSender {
    pub fn enqueue(&self, command: Command) -> Result<()> {
        match self.tx.try_send(command) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(command)) => {
                warn!("{} ⚠ 控制队列已满，丢弃命令: {:?}", log_ctx(&self.label), command);
                Err(PlayerError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => Err(PlayerError::Disconnected),
        }
    }
}

/// 消费者端，只由输入线程持有
pub struct CommandQueue {
    rx: Receiver<Command>,
}

impl CommandQueue {
    /// 取出当前所有命令
    pub fn drain(&self) -> Vec<Command> {
        self.rx.try_iter().collect()
    }

    /// 最多等待 `timeout` 直到有命令到来，然后取出所有命令
    pub fn wait(&self, timeout: Duration) -> Vec<Command> {
        match self.rx.recv_timeout(timeout) {
            Ok(first) => {
                let mut commands = vec![first];
                commands.extend(self.rx.try_iter());
                commands
            }
            Err(RecvTimeoutError::Timeout) => Vec::new(),
            Err(RecvTimeoutError::Disconnected) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// 创建一对有界的命令队列端
pub fn command_queue(label: &str) -> (CommandSender, CommandQueue) {
    let (tx, rx) = bounded(CONTROL_QUEUE_CAPACITY);
    (
        CommandSender {
            tx,
            label: label.to_string(),
        },
        CommandQueue { rx },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduce_keeps_last_of_consecutive_same_kind() {
        let commands = (1..=5).map(|i| Command::SetRate(i * 1000)).collect();
        assert_eq!(reduce(commands), vec![Command::SetRate(5000)]);
    }

    #[test]
    fn test_reduce_does_not_merge_across_kinds() {
        let commands = vec![Command::SetTime(1), Command::SetRate(2000), Command::SetTime(2)];
        assert_eq!(
            reduce(commands),
            vec![Command::SetTime(1), Command::SetRate(2000), Command::SetTime(2)]
        );
    }

    #[test]
    fn test_reduce_leaves_offsets_and_steps_alone() {
        let commands = vec![
            Command::SetTimeOffset(1),
            Command::SetTimeOffset(2),
            Command::SetRateFaster,
            Command::SetRateFaster,
            Command::SetTime(3),
            Command::SetTimeOffset(4),
        ];
        assert_eq!(reduce(commands.clone()), commands);
    }

    #[test]
    fn test_reduce_bookmark_and_title() {
        let commands = vec![
            Command::SetBookmark(1),
            Command::SetBookmark(2),
            Command::SetTitle(0),
            Command::SetTitle(3),
            Command::SetSeekpoint(1),
        ];
        assert_eq!(
            reduce(commands),
            vec![Command::SetBookmark(2), Command::SetTitle(3), Command::SetSeekpoint(1)]
        );
    }

    #[test]
    fn test_queue_preserves_order_and_bound() {
        let (tx, rx) = command_queue("test");
        for i in 0..CONTROL_QUEUE_CAPACITY {
            tx.enqueue(Command::SetEs(i as i32)).unwrap();
        }
        assert!(matches!(tx.enqueue(Command::Die), Err(PlayerError::QueueFull)));

        let drained = rx.drain();
        assert_eq!(drained.len(), CONTROL_QUEUE_CAPACITY);
        assert_eq!(drained[0], Command::SetEs(0));
        assert_eq!(drained[99], Command::SetEs(99));
        assert!(rx.is_empty());
    }

    #[test]
    fn test_wait_times_out_empty() {
        let (_tx, rx) = command_queue("test");
        assert!(rx.wait(Duration::from_millis(5)).is_empty());
    }

    #[test]
    fn test_disconnected_sender_reports_error() {
        let (tx, rx) = command_queue("test");
        drop(rx);
        assert!(matches!(tx.enqueue(Command::Die), Err(PlayerError::Disconnected)));
    }
}
