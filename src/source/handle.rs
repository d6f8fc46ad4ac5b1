use crate::core::{log_ctx, CancelToken, Micros, PlayerError, Result, SeekTarget};
use crate::source::locator::{Locator, SectionRange};
use crate::source::module::{Demux, DemuxStatus, ModuleRegistry, OpenContext, Updates};
use crate::source::stream::{BufferedStream, SharedAccess};
use crate::source::title::TitleTable;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 源的能力标记
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceCaps {
    pub can_pace: bool,
    pub can_rate: bool,
    pub rescale_ts: bool,
    pub can_pause: bool,
    pub can_seek: bool,
}

/// 一个已打开的 (access, demux) 对
///
/// 访问层自带解复用时没有 `access`，否则 demux 建立在缓冲字节流之上。
pub struct SourceHandle {
    label: String,
    locator: Locator,
    access_name: String,
    demux_name: String,
    access: Option<SharedAccess>,
    demux: Option<Box<dyn Demux>>,
    caps: SourceCaps,
    titles: Arc<TitleTable>,
    title: usize,
    seekpoint: usize,
    eof: bool,
    pts_delay: Micros,
    cancel: CancelToken,
    bytes_read: Option<Arc<AtomicU64>>,
    last_size: Option<u64>,
    pending: Updates,
}

impl SourceHandle {
    /// 打开源
    ///
    /// 依次尝试：解析后的定位符、百分号解码后的路径、把整个字符串当作不透明路径。
    /// 每次尝试先找自带解复用的访问模块，再走 access + 缓冲流 + demux。
    pub fn open(registry: &dyn ModuleRegistry, mrl: &str, forced_demux: &str, ctx: OpenContext) -> Result<Self> {
        let parsed = Locator::parse(mrl);
        let mut attempts = vec![parsed.clone()];
        if let Some(decoded) = parsed.percent_decoded() {
            attempts.push(decoded);
        }
        let opaque = Locator::opaque(mrl);
        if opaque != parsed {
            attempts.push(opaque);
        }

        let mut last_error = None;
        for (i, locator) in attempts.into_iter().enumerate() {
            if ctx.cancel.is_cancelled() {
                return Err(PlayerError::Cancelled);
            }
            info!(
                "{} 📂 打开源 (第 {} 次): access='{}' demux='{}' path='{}'",
                log_ctx(&ctx.label),
                i + 1,
                locator.access,
                locator.demux,
                locator.path
            );
            match Self::try_open(registry, locator, forced_demux, &ctx) {
                Ok(handle) => return Ok(handle),
                Err(e) => {
                    warn!("{} ⚠ 打开失败: {}", log_ctx(&ctx.label), e);
                    last_error = Some(e);
                }
            }
        }

        Err(PlayerError::OpenError(format!(
            "{} ({})",
            mrl,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    fn try_open(registry: &dyn ModuleRegistry, locator: Locator, forced_demux: &str, ctx: &OpenContext) -> Result<Self> {
        let demux_hint = if locator.demux.is_empty() {
            forced_demux.to_string()
        } else {
            locator.demux.clone()
        };

        match registry.open_access_demux(&locator.access, &demux_hint, &locator.path, ctx) {
            Ok(demux) => {
                // 自控节奏的源由输出端缩放时间戳
                let can_pace = demux.can_control_pace();
                let caps = SourceCaps {
                    can_pace,
                    can_rate: can_pace || demux.can_control_rate(),
                    rescale_ts: can_pace || demux.rescale_ts(),
                    can_pause: demux.can_pause(),
                    can_seek: demux.can_seek(),
                };
                let pts_delay = demux.pts_delay();
                let access_name = locator.access.clone();
                return Ok(Self::assemble(locator, access_name, demux_hint, None, demux, caps, pts_delay, None, ctx));
            }
            Err(e) => debug!("{} 无自解复用访问模块: {}", log_ctx(&ctx.label), e),
        }

        let access = registry.open_access(&locator.access, &locator.path, ctx)?;
        let caps_from_access = (access.can_control_pace(), access.can_pause(), access.can_seek());
        let pts_delay = access.pts_delay();
        let shared: SharedAccess = Arc::new(Mutex::new(access));
        let stream = BufferedStream::new(shared.clone());
        let counter = stream.bytes_counter();

        let demux = registry.open_demux(&demux_hint, &locator.path, stream, ctx)?;
        let caps = SourceCaps {
            can_pace: caps_from_access.0,
            can_rate: caps_from_access.0,
            rescale_ts: true,
            can_pause: caps_from_access.1,
            can_seek: caps_from_access.2,
        };
        let access_name = if locator.access.is_empty() {
            "file".to_string()
        } else {
            locator.access.clone()
        };
        Ok(Self::assemble(
            locator,
            access_name,
            demux_hint,
            Some(shared),
            demux,
            caps,
            pts_delay,
            Some(counter),
            ctx,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        locator: Locator,
        access_name: String,
        demux_name: String,
        access: Option<SharedAccess>,
        demux: Box<dyn Demux>,
        caps: SourceCaps,
        pts_delay: Micros,
        bytes_read: Option<Arc<AtomicU64>>,
        ctx: &OpenContext,
    ) -> Self {
        let titles = demux.titles().unwrap_or_default();
        let last_size = access.as_ref().and_then(|a| a.lock().size());
        info!(
            "{} ✅ 源已打开: access='{}' demux='{}' titles={} seekable={} pausable={}",
            log_ctx(&ctx.label),
            access_name,
            demux_name,
            titles.len(),
            caps.can_seek,
            caps.can_pause
        );
        Self {
            label: ctx.label.clone(),
            locator,
            access_name,
            demux_name,
            access,
            demux: Some(demux),
            caps,
            titles: Arc::new(titles),
            title: 0,
            seekpoint: 0,
            eof: false,
            pts_delay,
            cancel: ctx.cancel.clone(),
            bytes_read,
            last_size,
            pending: Updates::default(),
        }
    }

    fn demux_ref(&self) -> Result<&dyn Demux> {
        self.demux.as_deref().ok_or(PlayerError::Other("源已关闭".into()))
    }

    fn demux_mut(&mut self) -> Result<&mut (dyn Demux + 'static)> {
        self.demux.as_deref_mut().ok_or(PlayerError::Other("源已关闭".into()))
    }

    /// 驱动一次解复用
    ///
    /// `Ok(Continue)` 表示还有数据，`Ok(Eof)` 为干净结束，`Err` 为不可恢复错误。
    pub fn read(&mut self) -> Result<DemuxStatus> {
        let status = match self.demux_mut()?.demux() {
            Ok(status) => status,
            Err(PlayerError::Cancelled) => return Err(PlayerError::Cancelled),
            Err(e) => return Err(PlayerError::ReadError(e.to_string())),
        };

        self.collect_updates();

        if status == DemuxStatus::Continue && self.past_section_end() {
            debug!("{} 到达区段终点", log_ctx(&self.label));
            return Ok(DemuxStatus::Eof);
        }
        Ok(status)
    }

    fn collect_updates(&mut self) {
        let mut updates = match self.demux.as_mut() {
            Some(demux) => demux.take_updates(),
            None => return,
        };
        if let Some(access) = &self.access {
            let size = access.lock().size();
            if size != self.last_size {
                self.last_size = size;
                updates.size = size;
            }
        }
        if let Some(title) = updates.title {
            self.title = title;
            self.seekpoint = 0;
        }
        if let Some(seekpoint) = updates.seekpoint {
            self.seekpoint = seekpoint;
        }
        self.pending.merge(updates);
    }

    /// 只对设置了结束 title/seekpoint 的源生效
    fn past_section_end(&self) -> bool {
        let section = self.locator.section;
        let end_title = section.end_title.and_then(|t| self.titles.title_index(t));
        let end_seekpoint = section.end_seekpoint.and_then(|s| self.titles.seekpoint_index(s));
        match (end_title, end_seekpoint) {
            (Some(t), Some(s)) => self.title > t || (self.title == t && self.seekpoint > s),
            (None, Some(s)) => self.seekpoint > s,
            (Some(t), None) => self.title > t,
            (None, None) => false,
        }
    }

    /// 取走累积的更新位
    pub fn take_updates(&mut self) -> Updates {
        std::mem::take(&mut self.pending)
    }

    pub fn time(&self) -> Option<Micros> {
        self.demux_ref().ok()?.time()
    }

    pub fn length(&self) -> Option<Micros> {
        self.demux_ref().ok()?.length().filter(|l| *l > 0)
    }

    /// 位置 0.0 - 1.0；解复用器不报告时由时间和总长推算
    pub fn position(&self) -> Option<f64> {
        let demux = self.demux_ref().ok()?;
        if let Some(position) = demux.position() {
            return Some(position);
        }
        match (demux.time(), demux.length()) {
            (Some(time), Some(length)) if length > 0 => Some((time as f64 / length as f64).clamp(0.0, 1.0)),
            _ => None,
        }
    }

    /// 跳转；按时间跳转失败时，在总长已知的情况下改用等效的位置跳转
    pub fn seek(&mut self, target: SeekTarget) -> Result<()> {
        let length = self.length();
        let label = self.label.clone();
        let demux = self.demux_mut()?;
        let result = match target {
            SeekTarget::Position(position) => demux.set_position(position),
            SeekTarget::Time(time) => match demux.set_time(time) {
                Ok(()) => Ok(()),
                Err(e) => match length {
                    Some(length) => {
                        debug!("{} 按时间跳转失败 ({})，改用位置跳转", log_ctx(&label), e);
                        demux.set_position(time as f64 / length as f64)
                    }
                    None => Err(e),
                },
            },
        };
        match result {
            Ok(()) => {
                self.eof = false;
                Ok(())
            }
            Err(PlayerError::Unsupported(_)) | Err(PlayerError::SeekUnsupported) => Err(PlayerError::SeekUnsupported),
            Err(e) => Err(e),
        }
    }

    pub fn set_title(&mut self, index: usize) -> Result<()> {
        self.titles.check_title(index)?;
        self.demux_mut()?.set_title(index)?;
        self.title = index;
        self.seekpoint = 0;
        self.eof = false;
        Ok(())
    }

    pub fn set_seekpoint(&mut self, index: usize) -> Result<()> {
        self.titles.check_seekpoint(self.title, index)?;
        self.demux_mut()?.set_seekpoint(index)?;
        self.seekpoint = index;
        self.eof = false;
        Ok(())
    }

    pub fn set_next_demux_time(&mut self, time: Micros) -> Result<()> {
        self.demux_mut()?.set_next_demux_time(time)
    }

    /// 暂停/恢复：有访问层时交给访问层，否则交给解复用器
    pub fn set_pause_state(&mut self, paused: bool) -> Result<()> {
        match &self.access {
            Some(access) => access.lock().set_pause_state(paused),
            None => self.demux_mut()?.set_pause_state(paused),
        }
    }

    pub fn set_rate(&mut self, rate: i32) -> Result<i32> {
        self.demux_mut()?.set_rate(rate)
    }

    pub fn meta(&self) -> Vec<(String, String)> {
        let mut meta = self
            .access
            .as_ref()
            .map(|a| a.lock().meta())
            .unwrap_or_default();
        if let Ok(demux) = self.demux_ref() {
            meta.extend(demux.meta());
        }
        meta
    }

    /// 通知访问层/解复用器中止阻塞操作
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// 按获取的逆序释放 demux、access；可重复调用
    pub fn close(&mut self) {
        if self.demux.is_none() && self.access.is_none() {
            return;
        }
        self.demux.take();
        self.access.take();
        debug!("{} 源已关闭: {}", log_ctx(&self.label), self.locator.raw);
    }

    pub fn is_closed(&self) -> bool {
        self.demux.is_none()
    }

    pub fn caps(&self) -> SourceCaps {
        self.caps
    }

    pub fn titles(&self) -> Arc<TitleTable> {
        self.titles.clone()
    }

    pub fn title(&self) -> usize {
        self.title
    }

    pub fn seekpoint(&self) -> usize {
        self.seekpoint
    }

    pub fn eof(&self) -> bool {
        self.eof
    }

    pub fn set_eof(&mut self, eof: bool) {
        self.eof = eof;
    }

    pub fn pts_delay(&self) -> Micros {
        self.pts_delay
    }

    pub fn section(&self) -> SectionRange {
        self.locator.section
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn access_name(&self) -> &str {
        &self.access_name
    }

    pub fn demux_name(&self) -> &str {
        &self.demux_name
    }

    /// 从访问层读到的字节数；自解复用源返回 0
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.as_ref().map_or(0, |c| c.load(Ordering::Relaxed))
    }
}

impl Drop for SourceHandle {
    fn drop(&mut self) {
        self.close();
    }
}
