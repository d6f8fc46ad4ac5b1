use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "ffmpeg")]
    #[error("FFmpeg 错误: {0}")]
    FFmpegError(#[from] ffmpeg_next::Error),

    /// 主源所有打开尝试均失败
    #[error("无法打开输入源: {0}")]
    OpenError(String),

    /// 解复用返回不可恢复的错误
    #[error("读取失败: {0}")]
    ReadError(String),

    #[error("输入源不支持跳转")]
    SeekUnsupported,

    #[error("不支持的操作: {0}")]
    Unsupported(&'static str),

    #[error("{what} 索引越界: {index}（共 {count} 个）")]
    InvalidIndex {
        what: &'static str,
        index: usize,
        count: usize,
    },

    #[error("输入源拒绝暂停")]
    PauseRejected,

    #[error("无法打开从属源: {0}")]
    SlaveOpenError(String),

    #[error("从属源同步失败: {0}")]
    SlaveSyncError(String),

    #[error("控制命令队列已满")]
    QueueFull,

    #[error("输入线程已退出")]
    Disconnected,

    #[error("操作已取消")]
    Cancelled,

    #[error("书签格式错误: {0}")]
    BookmarkError(String),

    #[error("选项错误: {0}")]
    OptionError(String),

    #[error("其他错误: {0}")]
    Other(String),

    #[error("Anyhow 错误: {0}")]
    AnyhowError(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PlayerError>;
