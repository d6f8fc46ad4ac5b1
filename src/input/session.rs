use crate::core::{log_ctx, CancelToken, MediaItem, MetaSet, PlaybackState, PlayerError, Result};
use crate::input::command::{command_queue, Command, CommandSender};
use crate::input::lifecycle::run_input;
use crate::input::options::SessionOptions;
use crate::input::output::OutputSink;
use crate::input::stats::{InputStats, StatsHub};
use crate::input::status::{StatusEvent, StatusSnapshot};
use crate::input::thread::{InputContext, SessionShared};
use crate::source::{BookmarkList, ModuleRegistry, TitleTable};
use crossbeam_channel::Receiver;
use log::{info, warn};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// 一个播放会话：一个专用输入线程 + 对外的控制/查询接口
///
/// 任意线程都可以发送命令；会话状态只由输入线程修改。
pub struct Session {
    label: String,
    sender: CommandSender,
    cancel: CancelToken,
    shared: Arc<SessionShared>,
    thread_handle: Option<JoinHandle<()>>,
}

impl Session {
    /// 创建会话并启动输入线程，统计登记到进程级 `StatsHub`
    pub fn create(
        item: MediaItem,
        options: SessionOptions,
        registry: Arc<dyn ModuleRegistry>,
        out: Arc<dyn OutputSink>,
    ) -> Result<Self> {
        Self::create_with_hub(item, options, registry, out, StatsHub::global())
    }

    pub fn create_with_hub(
        item: MediaItem,
        mut options: SessionOptions,
        registry: Arc<dyn ModuleRegistry>,
        out: Arc<dyn OutputSink>,
        hub: Arc<StatsHub>,
    ) -> Result<Self> {
        options.apply_item_options(&item.options);
        let label = if item.name.is_empty() {
            item.uri.clone()
        } else {
            item.name.clone()
        };

        let (sender, queue) = command_queue(&label);
        let cancel = CancelToken::new();
        let shared = Arc::new(SessionShared::new());
        let ctx = InputContext {
            label: label.clone(),
            item,
            options,
            registry,
            out,
            cancel: cancel.clone(),
            queue,
            shared: shared.clone(),
            hub,
        };

        let thread_handle = thread::Builder::new()
            .name("input".into())
            .spawn(move || run_input(ctx))?;
        info!("{} 🚀 会话已创建", log_ctx(&label));

        Ok(Self {
            label,
            sender,
            cancel,
            shared,
            thread_handle: Some(thread_handle),
        })
    }

    /// 发送控制命令，队列满时返回 `QueueFull`
    pub fn control(&self, command: Command) -> Result<()> {
        self.sender.enqueue(command)
    }

    /// 可克隆到其他线程的命令发送端
    pub fn sender(&self) -> CommandSender {
        self.sender.clone()
    }

    pub fn status(&self) -> StatusSnapshot {
        self.shared.status.snapshot()
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.status.state()
    }

    pub fn subscribe(&self) -> Receiver<StatusEvent> {
        self.shared.status.subscribe()
    }

    pub fn titles(&self) -> Arc<TitleTable> {
        self.shared.titles.read().clone()
    }

    pub fn bookmarks(&self) -> BookmarkList {
        self.shared.bookmarks.read().clone()
    }

    pub fn meta(&self) -> MetaSet {
        self.shared.meta.read().clone()
    }

    pub fn stats(&self) -> InputStats {
        self.shared.stats.lock().clone()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// 请求停止：直接取消（打断阻塞读取），再补一条 Die
    pub fn stop(&self) {
        info!("{} 🛑 请求停止会话", log_ctx(&self.label));
        self.cancel.cancel();
        let _ = self.sender.enqueue(Command::Die);
    }

    /// 等待输入线程退出（包括等待输出端清空）
    pub fn join(&mut self) -> Result<()> {
        if let Some(handle) = self.thread_handle.take() {
            handle
                .join()
                .map_err(|_| PlayerError::Other("输入线程 panic".into()))?;
        }
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.thread_handle.as_ref().map_or(true, |h| h.is_finished())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            if !self.is_finished() {
                warn!("{} ⚠ Session 被 drop 时输入线程仍在运行，正在停止", log_ctx(&self.label));
            }
            self.stop();
            let _ = self.join();
        }
    }
}
