use crate::core::{log_ctx, CancelToken, MediaItem, MetaSet, Micros, PlaybackState, RateController};
use crate::input::command::{Command, CommandQueue};
use crate::input::options::{Repeat, SessionOptions};
use crate::input::output::OutputSink;
use crate::input::slave::SlaveSet;
use crate::input::stats::{BitrateMeter, InputStats, StatsHub, StatsRegistration};
use crate::input::status::{StatusBoard, StatusSnapshot};
use crate::source::{BookmarkList, ModuleRegistry, OpenContext, SourceHandle, TitleTable};
use log::info;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 状态发布周期
pub const STATUS_INTERVAL: Duration = Duration::from_millis(150);

/// 每发布多少次状态重新计算一次统计
pub const STATS_EVERY: u64 = 8;

/// 暂停时每次等待命令的时长
pub const PAUSED_QUANTUM: Duration = Duration::from_millis(10);

/// 等待下游清空时的睡眠时长
pub const IDLE_SLEEP: Duration = Duration::from_millis(10);

/// "上一章" 在章节开头这段时间内按下时跳到前一章
pub const SEEKPOINT_PREV_WINDOW: Micros = 3_000_000;

/// 会话与外部线程共享的只读视图
///
/// 只有输入线程写入；title 表整体替换，读者拿到的是不可变的 `Arc`。
pub struct SessionShared {
    pub status: StatusBoard,
    pub titles: RwLock<Arc<TitleTable>>,
    pub bookmarks: RwLock<BookmarkList>,
    pub meta: RwLock<MetaSet>,
    pub stats: Arc<Mutex<InputStats>>,
}

impl SessionShared {
    pub fn new() -> Self {
        Self {
            status: StatusBoard::new(),
            titles: RwLock::new(Arc::new(TitleTable::default())),
            bookmarks: RwLock::new(BookmarkList::default()),
            meta: RwLock::new(MetaSet::new()),
            stats: Arc::new(Mutex::new(InputStats::default())),
        }
    }
}

impl Default for SessionShared {
    fn default() -> Self {
        Self::new()
    }
}

/// 输入线程启动所需的一切，由会话构造后移入线程
pub struct InputContext {
    pub label: String,
    pub item: MediaItem,
    pub options: SessionOptions,
    pub registry: Arc<dyn ModuleRegistry>,
    pub out: Arc<dyn OutputSink>,
    pub cancel: CancelToken,
    pub queue: CommandQueue,
    pub shared: Arc<SessionShared>,
    pub hub: Arc<StatsHub>,
}

impl InputContext {
    /// 为新的源句柄派生打开上下文
    pub fn open_context(&self) -> OpenContext {
        OpenContext {
            cancel: self.cancel.child(),
            out: self.out.clone(),
            label: self.label.clone(),
        }
    }
}

/// 输入线程状态，只在输入线程内修改
pub struct InputThread {
    pub(super) ctx: InputContext,
    pub(super) master: SourceHandle,
    pub(super) slaves: SlaveSet,
    pub(super) rate: RateController,
    pub(super) state: PlaybackState,
    pub(super) repeat: Repeat,
    pub(super) start: Micros,
    pub(super) stop: Micros,
    pub(super) run: Micros,
    /// run-time 计时起点，每次重复播放时重置
    pub(super) started_at: Instant,
    pub(super) start_title: Option<usize>,
    pub(super) start_seekpoint: Option<usize>,
    pub(super) program: i32,
    pub(super) dying: bool,
    /// 输入线程自己补的命令（重复播放、起始位置），不经过有界队列，排在外部命令之前
    pub(super) pending: VecDeque<Command>,
    pub(super) stats: InputStats,
    pub(super) meter: BitrateMeter,
    pub(super) registration: Option<StatsRegistration>,
    pub(super) publish_count: u64,
    pub(super) next_publish: Instant,
}

impl InputThread {
    pub fn new(ctx: InputContext, master: SourceHandle) -> Self {
        let options = &ctx.options;
        let rate = RateController::new(options.caching_micros(), options.audio_desync_micros());
        Self {
            slaves: SlaveSet::new(&ctx.label),
            repeat: options.repeat,
            start: options.start(),
            stop: options.stop(),
            run: options.run(),
            started_at: Instant::now(),
            rate,
            master,
            state: PlaybackState::Opening,
            start_title: None,
            start_seekpoint: None,
            program: 0,
            dying: false,
            pending: VecDeque::new(),
            stats: InputStats::default(),
            meter: BitrateMeter::new(),
            registration: None,
            publish_count: 0,
            next_publish: Instant::now() + STATUS_INTERVAL,
            ctx,
        }
    }

    pub(super) fn label(&self) -> String {
        log_ctx(&self.ctx.label)
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_dying(&self) -> bool {
        self.dying || self.ctx.cancel.is_cancelled()
    }

    /// 补一条线程内部命令，下一批命令处理时最先应用
    pub(super) fn enqueue(&mut self, command: Command) {
        self.pending.push_back(command);
    }

    /// 只改状态不发布；调用方负责让本轮结束时的那次发布带上它
    pub(super) fn set_state(&mut self, state: PlaybackState) {
        if self.state == state {
            return;
        }
        info!("{} 🔄 状态 {:?} -> {:?}", self.label(), self.state, state);
        self.state = state;
    }

    /// 按主源和所有从属源的延迟重新计算 pts 延迟预算
    pub(super) fn update_pts_delay(&mut self) {
        let mut delays = vec![self.master.pts_delay()];
        delays.extend(self.slaves.pts_delays());
        self.rate.update_pts_delay(delays);
    }

    /// 查询主源并发布状态；每 STATS_EVERY 次顺带更新统计
    pub(super) fn publish_status(&mut self) {
        let titles = self.master.titles();
        let caps = self.master.caps();
        let title = self.master.title();
        let snapshot = StatusSnapshot {
            state: self.state,
            position: self.master.position().unwrap_or(0.0),
            time: self.master.time().unwrap_or(0),
            length: self.master.length().unwrap_or(0),
            rate: self.rate.rate(),
            title,
            seekpoint: self.master.seekpoint(),
            title_count: titles.len(),
            seekpoint_count: titles.seekpoint_count(title),
            bit_rate: self.stats.input_bitrate,
            sample_rate: self.ctx.out.sample_rate().unwrap_or(0),
            seekable: caps.can_seek,
            can_pause: caps.can_pause,
            can_rate: caps.can_rate || caps.can_pace,
            eof: self.master.eof(),
            program: self.program,
            audio_delay: self.rate.audio_delay(),
            spu_delay: self.rate.spu_delay(),
            pts_delay: self.rate.pts_delay(),
        };
        self.ctx.shared.status.publish(snapshot);

        self.publish_count += 1;
        if self.publish_count % STATS_EVERY == 0 {
            self.update_stats();
        }
    }

    pub(super) fn update_stats(&mut self) {
        let bytes = self.master.bytes_read() + self.slaves.bytes_read();
        self.stats.bytes_read = bytes;
        self.stats.input_bitrate = self.meter.sample(bytes);
        self.stats.slave_eof = self.slaves.eof_count();
        *self.ctx.shared.stats.lock() = self.stats.clone();
        if let Some(registration) = &self.registration {
            registration.aggregate_if_designated();
        }
    }
}
