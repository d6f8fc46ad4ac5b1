use crate::core::{PlaybackState, PlayerError};
use crate::input::command::{reduce, Command};
use crate::input::thread::{InputThread, IDLE_SLEEP, PAUSED_QUANTUM, STATUS_INTERVAL};
use crate::source::DemuxStatus;
use log::{debug, error, info};
use std::time::{Duration, Instant};

impl InputThread {
    /// 输入线程主循环
    pub(super) fn main_loop(&mut self) {
        info!("{} ▶ 进入主循环", self.label());
        while self.iterate() {}
        debug!("{} 主循环结束: {:?}", self.label(), self.state);
    }

    /// 主循环的一轮：读一次主源（暂停时改为等待命令）→ 合并并应用命令 → 按需发布状态
    ///
    /// 返回 false 表示应当退出循环。
    pub(super) fn iterate(&mut self) -> bool {
        if self.is_dying() {
            return false;
        }
        if self.state.is_terminal() {
            if self.state == PlaybackState::Ended && !self.ctx.out.is_drained() {
                // 等输出端把排队的数据消费完，期间只响应退出
                if self.ctx.queue.wait(IDLE_SLEEP).contains(&Command::Die) {
                    self.die();
                }
                return true;
            }
            return false;
        }

        let mut force_publish = false;
        let external = if self.state != PlaybackState::Paused {
            force_publish |= self.demux_step();
            self.ctx.queue.drain()
        } else if self.pending.is_empty() {
            self.ctx.queue.wait(PAUSED_QUANTUM)
        } else {
            self.ctx.queue.drain()
        };
        let mut commands: Vec<Command> = self.pending.drain(..).collect();
        commands.extend(external);

        // 状态变化只在整批命令应用完后发布一次
        for command in reduce(commands) {
            force_publish |= self.control(command);
        }

        let now = Instant::now();
        if force_publish || now >= self.next_publish {
            self.publish_status();
            self.next_publish = now + STATUS_INTERVAL;
        }
        true
    }

    /// 驱动一次主源解复用，返回是否需要立即发布状态
    fn demux_step(&mut self) -> bool {
        let status = if self.window_exceeded() {
            debug!("{} ⏹ 到达停止时间", self.label());
            Ok(DemuxStatus::Eof)
        } else {
            self.stats.demux_calls += 1;
            self.master.read()
        };

        let mut force_publish = self.absorb_updates();
        match status {
            Ok(DemuxStatus::Continue) => {
                if self.state == PlaybackState::Buffering {
                    self.set_state(PlaybackState::Playing);
                    force_publish = true;
                }
                if !self.slaves.is_empty() {
                    let master_time = self.master.time().unwrap_or(0);
                    force_publish |= self.slaves.advance(master_time) > 0;
                }
            }
            Ok(DemuxStatus::Eof) => {
                self.handle_eof();
                force_publish = true;
            }
            Err(PlayerError::Cancelled) => {
                debug!("{} 读取被取消", self.label());
                self.dying = true;
            }
            Err(e) => {
                if !self.is_dying() {
                    error!("{} ❌ 主源读取失败: {}", self.label(), e);
                    self.set_state(PlaybackState::Error);
                }
                force_publish = true;
            }
        }
        force_publish
    }

    /// stop-time 按流时间判断，run-time 按墙钟判断
    fn window_exceeded(&self) -> bool {
        if self.stop > 0 && self.master.time().map_or(false, |time| time >= self.stop) {
            return true;
        }
        self.run > 0 && self.started_at.elapsed() >= Duration::from_micros(self.run as u64)
    }

    /// 把主源的更新位转成会话级状态
    fn absorb_updates(&mut self) -> bool {
        let updates = self.master.take_updates();
        if updates.is_empty() {
            return false;
        }
        if updates.meta {
            let merged = self.ctx.shared.meta.write().merge(self.master.meta());
            debug!("{} 元数据更新 {} 条", self.label(), merged);
        }
        if let Some(size) = updates.size {
            debug!("{} 源大小变为 {} 字节", self.label(), size);
        }
        if updates.title.is_some() || updates.seekpoint.is_some() {
            debug!(
                "{} 导航变化: title={} seekpoint={}",
                self.label(),
                self.master.title(),
                self.master.seekpoint()
            );
        }
        true
    }

    /// 结尾处理：还有重复次数就排队回到起点，否则结束
    fn handle_eof(&mut self) {
        if !self.repeat.consume() {
            info!("{} 📄 主源到达结尾", self.label());
            self.master.set_eof(true);
            self.set_state(PlaybackState::Ended);
            return;
        }

        info!("{} 🔁 到达结尾，重新开始 (剩余 {:?})", self.label(), self.repeat);
        if !self.master.titles().is_empty() {
            self.enqueue(Command::SetTitle(self.start_title.unwrap_or(0)));
        }
        if let Some(seekpoint) = self.start_seekpoint.filter(|s| *s > 0) {
            self.enqueue(Command::SetSeekpoint(seekpoint));
        }
        if self.start > 0 {
            self.enqueue(Command::SetTime(self.start));
        } else {
            self.enqueue(Command::SetPosition(0.0));
        }
        self.started_at = Instant::now();
    }
}
