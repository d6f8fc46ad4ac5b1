//! 播放器输入编排核心
//!
//! 一个会话对应一个专用输入线程：打开主源（access + demux），驱动解复用，
//! 让从属源（外挂字幕等）跟上主源时间，并把任意线程发来的控制命令合并后应用。

pub mod core;
pub mod input;
pub mod source;

#[cfg(test)]
mod testing;

pub use crate::core::{MediaItem, PlaybackState, PlayerError, RequestedState, Result};
pub use crate::input::{Command, OutputSink, QueueSink, Session, SessionOptions, StatusEvent, StatusSnapshot};
pub use crate::source::{BuiltinRegistry, ModuleRegistry};
