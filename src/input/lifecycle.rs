use crate::core::{log_ctx, PlaybackState, RATE_DEFAULT};
use crate::input::command::Command;
use crate::input::thread::{InputContext, InputThread};
use crate::source::subtitle::is_subtitle_path;
use crate::source::{find_subtitle_files, BookmarkList, SourceHandle};
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};

/// 自动加载字幕时强制使用的解复用模块
const SUBTITLE_DEMUX: &str = "subtitle";

/// 输入线程入口：打开主源 → 初始化 → 主循环 → 收尾
pub fn run_input(ctx: InputContext) {
    let label = log_ctx(&ctx.label);
    info!("{} 🎬 输入线程启动: {}", label, ctx.item.uri);
    ctx.shared.status.set_state(PlaybackState::Opening);

    let master = match SourceHandle::open(ctx.registry.as_ref(), &ctx.item.uri, &ctx.options.demux, ctx.open_context()) {
        Ok(master) => master,
        Err(e) => {
            if ctx.cancel.is_cancelled() {
                info!("{} 🛑 打开过程中被取消", label);
                ctx.shared.status.set_state(PlaybackState::Ended);
            } else {
                error!("{} ❌ {}", label, e);
                ctx.shared.status.set_state(PlaybackState::Error);
            }
            return;
        }
    };

    let mut thread = InputThread::new(ctx, master);
    thread.init();
    thread.main_loop();
    thread.end();
    info!("{} 🛑 输入线程退出", label);
}

impl InputThread {
    /// 打开后的初始化：起始位置、字幕与从属源、书签、元数据、统计登记
    pub(super) fn init(&mut self) {
        let titles = self.master.titles();
        *self.ctx.shared.titles.write() = titles.clone();

        let section = self.master.section();
        self.start_title = section.start_title.and_then(|t| titles.title_index(t));
        self.start_seekpoint = section.start_seekpoint.and_then(|s| titles.seekpoint_index(s));
        if let Some(title) = self.start_title.filter(|t| *t > 0) {
            self.enqueue(Command::SetTitle(title));
        }
        if let Some(seekpoint) = self.start_seekpoint.filter(|s| *s > 0) {
            self.enqueue(Command::SetSeekpoint(seekpoint));
        }

        if self.start > 0 {
            info!("{} ⏩ 从 {}µs 开始播放", self.label(), self.start);
            self.enqueue(Command::SetTime(self.start));
        }
        if self.stop > 0 && self.stop <= self.start {
            warn!("{} ⚠ stop-time 不晚于 start-time，忽略", self.label());
            self.stop = 0;
        }

        let rate = (RATE_DEFAULT as f64 * self.ctx.options.rate).round() as i32;
        if rate != RATE_DEFAULT {
            self.enqueue(Command::SetRate(rate));
        }

        self.open_subtitles();
        for locator in self.ctx.options.slaves.clone() {
            if let Err(e) = self.add_slave(&locator, "") {
                warn!("{} ⚠ 跳过从属源: {}", self.label(), e);
            }
        }
        self.update_pts_delay();

        if let Some(bookmarks) = self.ctx.options.bookmarks.clone() {
            match BookmarkList::parse(&bookmarks) {
                Ok(list) => {
                    debug!("{} 🔖 载入 {} 个书签", self.label(), list.len());
                    *self.ctx.shared.bookmarks.write() = list;
                }
                Err(e) => warn!("{} ⚠ 书签无效: {}", self.label(), e),
            }
        }

        self.ctx.shared.meta.write().merge(self.master.meta());
        self.registration = Some(self.ctx.hub.register(&self.ctx.label, self.ctx.shared.stats.clone()));
        self.set_state(PlaybackState::Buffering);
        self.publish_status();
    }

    /// 显式字幕文件优先，然后在本地主源旁边查找，同一个文件只打开一次
    fn open_subtitles(&mut self) {
        let mut opened: Vec<PathBuf> = Vec::new();
        if let Some(sub_file) = self.ctx.options.sub_file.clone() {
            match self.add_slave(&sub_file, SUBTITLE_DEMUX) {
                Ok(()) => opened.push(PathBuf::from(sub_file)),
                Err(e) => warn!("{} ⚠ 字幕文件无法加载: {}", self.label(), e),
            }
        }

        if !self.ctx.options.sub_autodetect {
            return;
        }
        let master_path = PathBuf::from(&self.master.locator().path);
        if !master_path.is_file() || is_subtitle_path(&master_path) {
            return;
        }

        for candidate in find_subtitle_files(&master_path, self.ctx.options.sub_autodetect_fuzzy) {
            if opened.iter().any(|p| same_file(p, &candidate)) {
                continue;
            }
            let locator = candidate.to_string_lossy().into_owned();
            match self.add_slave(&locator, SUBTITLE_DEMUX) {
                Ok(()) => {
                    info!("{} 💬 自动加载字幕: {}", self.label(), locator);
                    opened.push(candidate);
                }
                Err(e) => warn!("{} ⚠ 自动字幕加载失败: {}", self.label(), e),
            }
        }
    }

    /// 收尾：发布最终状态，关闭所有源，注销统计
    pub(super) fn end(&mut self) {
        if self.state != PlaybackState::Error {
            self.set_state(PlaybackState::Ended);
        }
        self.update_stats();
        self.publish_status();

        self.slaves.close_all();
        self.master.close();
        debug!("{} 📊 最终统计: {:?}", self.label(), self.stats);
        self.registration.take();
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
