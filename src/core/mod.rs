// 核心数据结构和类型定义

pub mod cancel;
pub mod clock;
pub mod error;
pub mod types;

pub use cancel::CancelToken;
pub use clock::*;
pub use error::*;
pub use types::*;

use std::process;
use std::thread;

/// 日志上下文前缀：进程、线程和会话标签
pub fn log_ctx(label: &str) -> String {
    format!("[pid:{} tid:{:?} {}]", process::id(), thread::current().id(), label)
}
