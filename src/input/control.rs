use crate::core::{step_rate, Micros, PacketType, PlaybackState, PlayerError, RateCaps, RateStep, RequestedState, Result, SeekTarget};
use crate::input::command::Command;
use crate::input::thread::{InputThread, SEEKPOINT_PREV_WINDOW};
use crate::source::SourceHandle;
use log::{debug, error, info, warn};

impl InputThread {
    /// 应用一条命令，返回是否需要立即发布状态
    pub(super) fn control(&mut self, command: Command) -> bool {
        debug!("{} 🎛 控制命令: {:?}", self.label(), command);
        let kind = command.kind();
        match self.apply_control(command) {
            Ok(changed) => changed,
            Err(PlayerError::PauseRejected) => {
                // 发布实际状态，而不是请求的状态
                warn!("{} ⚠ 暂停被拒绝，保持 {:?}", self.label(), self.state);
                true
            }
            Err(e) => {
                warn!("{} ⚠ 命令 {:?} 被丢弃: {}", self.label(), kind, e);
                false
            }
        }
    }

    pub(super) fn apply_control(&mut self, command: Command) -> Result<bool> {
        match command {
            Command::Die => {
                self.die();
                Ok(true)
            }
            Command::SetPosition(position) => self.seek_position(position),
            Command::SetPositionOffset(offset) => {
                let current = self.master.position().unwrap_or(0.0);
                self.seek_position(current + offset)
            }
            Command::SetTime(time) => self.seek_time(time),
            Command::SetTimeOffset(offset) => {
                let current = self.master.time().unwrap_or(0);
                self.seek_time(current.saturating_add(offset))
            }
            Command::SetState(RequestedState::Paused) => self.pause(),
            Command::SetState(RequestedState::Playing) => self.unpause(),
            Command::SetRate(rate) => Ok(self.change_rate(rate)),
            Command::SetRateSlower => Ok(self.change_rate(step_rate(self.rate.rate(), RateStep::Slower))),
            Command::SetRateFaster => Ok(self.change_rate(step_rate(self.rate.rate(), RateStep::Faster))),
            Command::SetProgram(program) => {
                self.ctx.out.select_program(program)?;
                info!("{} 📺 切换节目: {}", self.label(), program);
                self.program = program;
                Ok(true)
            }
            Command::SetEs(es_id) => {
                self.ctx.out.select_es(es_id)?;
                Ok(true)
            }
            Command::SetAudioDelay(delay) => {
                self.rate.set_audio_delay(delay);
                self.ctx.out.set_delay(PacketType::Audio, delay);
                self.update_pts_delay();
                Ok(true)
            }
            Command::SetSpuDelay(delay) => {
                self.rate.set_spu_delay(delay);
                self.ctx.out.set_delay(PacketType::Subtitle, delay);
                self.update_pts_delay();
                Ok(true)
            }
            Command::SetTitle(index) => self.select_title(Some(index)),
            Command::SetTitleNext => self.select_title(Some(self.master.title() + 1)),
            Command::SetTitlePrev => self.select_title(self.master.title().checked_sub(1)),
            Command::SetSeekpoint(index) => self.select_seekpoint(Some(index)),
            Command::SetSeekpointNext => self.select_seekpoint(Some(self.master.seekpoint() + 1)),
            Command::SetSeekpointPrev => {
                let target = self.previous_seekpoint();
                self.select_seekpoint(target)
            }
            Command::AddSlave(locator) => {
                self.add_slave(&locator, "")?;
                Ok(true)
            }
            Command::SetBookmark(index) => {
                error!("{} ❌ 设置书签 {} 尚未实现", self.label(), index);
                Err(PlayerError::Unsupported("set_bookmark"))
            }
        }
    }

    /// 取消主源和所有从属源，并标记线程退出
    pub(super) fn die(&mut self) {
        info!("{} 🛑 收到退出请求", self.label());
        self.master.cancel();
        self.slaves.cancel_all();
        self.dying = true;
    }

    fn seek_position(&mut self, position: f64) -> Result<bool> {
        let position = if position.is_nan() { 0.0 } else { position.clamp(0.0, 1.0) };
        self.seek(SeekTarget::Position(position))
    }

    fn seek_time(&mut self, time: Micros) -> Result<bool> {
        self.seek(SeekTarget::Time(time.max(0)))
    }

    /// 先让输出端丢弃在途数据，再跳转主源，最后同步从属源
    fn seek(&mut self, target: SeekTarget) -> Result<bool> {
        info!("{} ⏩ 跳转: {:?}", self.label(), target);
        self.ctx.out.flush();
        self.master.seek(target)?;

        let master_time = match (self.master.time(), target) {
            (Some(time), _) => time,
            (None, SeekTarget::Time(time)) => time,
            (None, SeekTarget::Position(position)) => self
                .master
                .length()
                .map_or(0, |length| (length as f64 * position) as Micros),
        };
        self.slaves.seek_all(master_time);
        Ok(true)
    }

    fn pause(&mut self) -> Result<bool> {
        if self.state == PlaybackState::Paused {
            return Ok(false);
        }
        if !self.master.caps().can_pause {
            return Err(PlayerError::PauseRejected);
        }
        if let Err(e) = self.master.set_pause_state(true) {
            warn!("{} ⚠ 源无法暂停: {}", self.label(), e);
            return Err(PlayerError::PauseRejected);
        }
        self.ctx.out.set_pause_state(true);
        self.set_state(PlaybackState::Paused);
        Ok(true)
    }

    fn unpause(&mut self) -> Result<bool> {
        if self.state != PlaybackState::Paused {
            return Ok(false);
        }
        if let Err(e) = self.master.set_pause_state(false) {
            // 源停在暂停状态，无法继续
            error!("{} ❌ 恢复播放失败，结束会话: {}", self.label(), e);
            self.set_state(PlaybackState::Error);
            self.die();
            return Ok(true);
        }
        self.ctx.out.set_pause_state(false);
        self.set_state(PlaybackState::Playing);
        Ok(true)
    }

    fn change_rate(&mut self, requested: i32) -> bool {
        let caps = self.master.caps();
        let rate_caps = RateCaps {
            can_pace: caps.can_pace,
            can_rate: caps.can_rate,
            rescale: caps.rescale_ts,
            out_pace_control: self.ctx.options.out_pace_control,
        };
        let master = &mut self.master;
        let change = self.rate.set_rate(requested, rate_caps, |rate| master.set_rate(rate));
        if change.changed && change.rescale {
            self.ctx.out.set_rate(change.applied);
        }
        change.changed
    }

    /// 无效的索引只记录调试日志
    fn select_title(&mut self, index: Option<usize>) -> Result<bool> {
        let titles = self.master.titles();
        let Some(index) = index.filter(|i| titles.check_title(*i).is_ok()) else {
            debug!("{} 忽略无效 title: {:?}（共 {} 个）", self.label(), index, titles.len());
            return Ok(false);
        };
        info!("{} 📀 切换到 {}", self.label(), titles.title_label(index));
        self.ctx.out.flush();
        self.master.set_title(index)?;
        Ok(true)
    }

    fn select_seekpoint(&mut self, index: Option<usize>) -> Result<bool> {
        let titles = self.master.titles();
        let title = self.master.title();
        let Some(index) = index.filter(|i| titles.check_seekpoint(title, *i).is_ok()) else {
            debug!(
                "{} 忽略无效 seekpoint: {:?}（共 {} 个）",
                self.label(),
                index,
                titles.seekpoint_count(title)
            );
            return Ok(false);
        };
        info!("{} 🔖 切换到 {}", self.label(), titles.seekpoint_label(title, index));
        self.ctx.out.flush();
        self.master.set_seekpoint(index)?;
        Ok(true)
    }

    /// 刚进入当前章节不久（或时间未知）时回到上一章，否则回到当前章节开头
    fn previous_seekpoint(&self) -> Option<usize> {
        let titles = self.master.titles();
        let title = self.master.title();
        let current = self.master.seekpoint();
        let start = titles.seekpoint(title, current).map(|s| s.time_offset);
        match (start, self.master.time()) {
            (Some(start), Some(now)) if start >= 0 && now >= start + SEEKPOINT_PREV_WINDOW => Some(current),
            _ => current.checked_sub(1),
        }
    }

    /// 打开从属源，跳到主源当前时间后加入集合
    pub(super) fn add_slave(&mut self, locator: &str, forced_demux: &str) -> Result<()> {
        info!("{} ➕ 添加从属源: {}", self.label(), locator);
        let mut slave = SourceHandle::open(
            self.ctx.registry.as_ref(),
            locator,
            forced_demux,
            self.ctx.open_context(),
        )
        .map_err(|e| match e {
            PlayerError::Cancelled => PlayerError::Cancelled,
            other => PlayerError::SlaveOpenError(format!("{}: {}", locator, other)),
        })?;

        let master_time = self.master.time().unwrap_or(0);
        if let Err(e) = slave.seek(SeekTarget::Time(master_time)) {
            slave.close();
            return Err(PlayerError::SlaveSyncError(format!("{}: {}", locator, e)));
        }

        let merged = self.ctx.shared.meta.write().merge(slave.meta());
        if merged > 0 {
            debug!("{} 从属源带来 {} 条元数据", self.label(), merged);
        }
        self.slaves.push(slave);
        self.update_pts_delay();
        Ok(())
    }
}
