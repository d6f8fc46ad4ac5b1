// 输入会话：命令队列、从属源同步、状态发布、统计和输入线程

pub mod command;
mod control;
mod lifecycle;
pub mod options;
pub mod output;
mod run_loop;
pub mod session;
pub mod slave;
pub mod stats;
pub mod status;
pub mod thread;


pub use command::{command_queue, reduce, Command, CommandKind, CommandQueue, CommandSender, CONTROL_QUEUE_CAPACITY};
pub use options::{Repeat, SessionOptions};
pub use output::{NullSink, OutputSink, QueueSink, SinkEvent};
pub use session::Session;
pub use slave::SlaveSet;
pub use stats::{InputStats, StatsHub, StatsRegistration};
pub use status::{StatusBoard, StatusEvent, StatusSnapshot};
