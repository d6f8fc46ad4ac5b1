use crate::core::{CancelToken, Micros, PlayerError, Result};
use crate::input::output::OutputSink;
use crate::source::stream::BufferedStream;
use crate::source::title::TitleTable;
use std::sync::Arc;

/// 一次解复用步骤的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemuxStatus {
    /// 还有数据，应继续调用
    Continue,
    /// 干净的流结束
    Eof,
}

/// 解复用器报告的更新位，由调用方取走后转成会话级通知
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Updates {
    /// 切换到了新的 title
    pub title: Option<usize>,
    /// 切换到了新的 seekpoint
    pub seekpoint: Option<usize>,
    /// 源大小变化（字节）
    pub size: Option<u64>,
    /// 元数据变化
    pub meta: bool,
}

impl Updates {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.seekpoint.is_none() && self.size.is_none() && !self.meta
    }

    /// 合并后到的更新，后者覆盖前者
    pub fn merge(&mut self, other: Updates) {
        if other.title.is_some() {
            self.title = other.title;
            self.seekpoint = None;
        }
        if other.seekpoint.is_some() {
            self.seekpoint = other.seekpoint;
        }
        if other.size.is_some() {
            self.size = other.size;
        }
        self.meta |= other.meta;
    }
}

/// 访问层：原始字节源
pub trait Access: Send {
    /// 读取字节，返回 0 表示结束
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// 定位到绝对字节偏移
    fn seek(&mut self, _offset: u64) -> Result<()> {
        Err(PlayerError::SeekUnsupported)
    }

    fn size(&self) -> Option<u64> {
        None
    }

    fn can_seek(&self) -> bool {
        false
    }

    fn can_pause(&self) -> bool {
        true
    }

    fn can_control_pace(&self) -> bool {
        true
    }

    fn set_pause_state(&mut self, _paused: bool) -> Result<()> {
        Ok(())
    }

    /// 该源建议的缓冲延迟
    fn pts_delay(&self) -> Micros {
        0
    }

    fn meta(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// 解复用器：驱动一次解复用步骤，并提供时间/导航控制
///
/// 未实现的控制默认返回 `Unsupported` / `SeekUnsupported`。
pub trait Demux: Send {
    fn demux(&mut self) -> Result<DemuxStatus>;

    fn time(&self) -> Option<Micros> {
        None
    }

    fn length(&self) -> Option<Micros> {
        None
    }

    fn position(&self) -> Option<f64> {
        None
    }

    fn set_time(&mut self, _time: Micros) -> Result<()> {
        Err(PlayerError::SeekUnsupported)
    }

    fn set_position(&mut self, _position: f64) -> Result<()> {
        Err(PlayerError::SeekUnsupported)
    }

    /// 让下一次 `demux` 一直读到指定时间（从属源追赶主源用）
    fn set_next_demux_time(&mut self, _time: Micros) -> Result<()> {
        Err(PlayerError::Unsupported("set_next_demux_time"))
    }

    /// title/seekpoint 表，只在打开时取一次
    fn titles(&self) -> Option<TitleTable> {
        None
    }

    fn set_title(&mut self, _index: usize) -> Result<()> {
        Err(PlayerError::Unsupported("set_title"))
    }

    fn set_seekpoint(&mut self, _index: usize) -> Result<()> {
        Err(PlayerError::Unsupported("set_seekpoint"))
    }

    /// 取走自上次调用以来的更新位
    fn take_updates(&mut self) -> Updates {
        Updates::default()
    }

    fn can_seek(&self) -> bool {
        false
    }

    fn can_pause(&self) -> bool {
        true
    }

    fn can_control_pace(&self) -> bool {
        true
    }

    fn can_control_rate(&self) -> bool {
        false
    }

    /// 改变速率后是否需要输出端重新缩放时间戳
    fn rescale_ts(&self) -> bool {
        false
    }

    fn set_pause_state(&mut self, _paused: bool) -> Result<()> {
        Ok(())
    }

    /// 设置速率，返回源实际采用的速率
    fn set_rate(&mut self, _rate: i32) -> Result<i32> {
        Err(PlayerError::Unsupported("set_rate"))
    }

    fn pts_delay(&self) -> Micros {
        0
    }

    fn meta(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// 打开模块时传入的上下文
#[derive(Clone)]
pub struct OpenContext {
    /// 源句柄的取消标记，模块在阻塞操作中应轮询
    pub cancel: CancelToken,
    /// 基本流输出端
    pub out: Arc<dyn OutputSink>,
    /// 日志标签
    pub label: String,
}

/// 插件式模块查找
///
/// `access` / `demux` 为空字符串表示"任意"，由注册表自行探测。
pub trait ModuleRegistry: Send + Sync {
    /// 打开一个自带解复用能力的访问模块
    fn open_access_demux(&self, access: &str, demux: &str, path: &str, ctx: &OpenContext) -> Result<Box<dyn Demux>>;

    /// 打开原始字节访问模块
    fn open_access(&self, access: &str, path: &str, ctx: &OpenContext) -> Result<Box<dyn Access>>;

    /// 在缓冲字节流上探测/打开解复用器
    fn open_demux(&self, demux: &str, path: &str, stream: BufferedStream, ctx: &OpenContext) -> Result<Box<dyn Demux>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_updates_merge_resets_seekpoint_on_title_change() {
        let mut updates = Updates {
            seekpoint: Some(3),
            ..Default::default()
        };
        updates.merge(Updates {
            title: Some(1),
            ..Default::default()
        });
        assert_eq!(updates.title, Some(1));
        assert_eq!(updates.seekpoint, None);
        assert!(!updates.is_empty());
        assert!(Updates::default().is_empty());
    }
}
