//! 测试用的脚本化协作者：模拟解复用器、模块注册表和等待工具

use crate::core::{Micros, PlayerError, Result};
use crate::input::{Session, StatusSnapshot};
use crate::source::{Access, BufferedStream, BuiltinRegistry, Demux, DemuxStatus, ModuleRegistry, OpenContext, TitleTable};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 模拟源的行为脚本
#[derive(Debug, Clone)]
pub struct MockScript {
    pub length: Option<Micros>,
    /// 每次读取推进的时间
    pub step: Micros,
    pub always_eof: bool,
    pub fail_reads: bool,
    pub can_seek: bool,
    pub time_seek: bool,
    pub can_pause: bool,
    pub can_pace: bool,
    pub can_rate: bool,
    pub catch_up: bool,
    pub fail_resume: bool,
    pub titles: Option<TitleTable>,
    pub meta: Vec<(String, String)>,
    pub read_delay: Duration,
}

impl Default for MockScript {
    fn default() -> Self {
        Self {
            length: None,
            step: 0,
            always_eof: false,
            fail_reads: false,
            can_seek: true,
            time_seek: true,
            can_pause: true,
            can_pace: true,
            can_rate: false,
            catch_up: false,
            fail_resume: false,
            titles: None,
            meta: Vec::new(),
            read_delay: Duration::ZERO,
        }
    }
}

/// 记录模拟源收到的调用
#[derive(Debug, Default)]
pub struct Probe {
    pub reads: AtomicUsize,
    pub force_eof: AtomicBool,
    pub positions: Mutex<Vec<f64>>,
    pub times: Mutex<Vec<Micros>>,
    pub pauses: Mutex<Vec<bool>>,
    pub rates: Mutex<Vec<i32>>,
    pub titles: Mutex<Vec<usize>>,
    pub seekpoints: Mutex<Vec<usize>>,
}

impl Probe {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn positions(&self) -> Vec<f64> {
        self.positions.lock().clone()
    }

    pub fn times(&self) -> Vec<Micros> {
        self.times.lock().clone()
    }
}

pub struct MockDemux {
    script: MockScript,
    probe: Arc<Probe>,
    time: Micros,
    seekpoint: Option<usize>,
}

impl MockDemux {
    pub fn new(script: MockScript, probe: Arc<Probe>) -> Self {
        Self {
            script,
            probe,
            time: 0,
            seekpoint: None,
        }
    }
}

impl Demux for MockDemux {
    fn demux(&mut self) -> Result<DemuxStatus> {
        self.probe.reads.fetch_add(1, Ordering::SeqCst);
        if !self.script.read_delay.is_zero() {
            std::thread::sleep(self.script.read_delay);
        }
        if self.script.fail_reads {
            return Err(PlayerError::ReadError("scripted failure".into()));
        }
        if self.script.always_eof || self.probe.force_eof.load(Ordering::SeqCst) {
            return Ok(DemuxStatus::Eof);
        }
        self.time += self.script.step;
        if let Some(length) = self.script.length {
            if self.time >= length {
                self.time = length;
                return Ok(DemuxStatus::Eof);
            }
        }
        Ok(DemuxStatus::Continue)
    }

    fn time(&self) -> Option<Micros> {
        Some(self.time)
    }

    fn length(&self) -> Option<Micros> {
        self.script.length
    }

    fn set_time(&mut self, time: Micros) -> Result<()> {
        if !self.script.time_seek {
            return Err(PlayerError::SeekUnsupported);
        }
        self.probe.times.lock().push(time);
        self.time = time;
        Ok(())
    }

    fn set_position(&mut self, position: f64) -> Result<()> {
        if !self.script.can_seek {
            return Err(PlayerError::SeekUnsupported);
        }
        self.probe.positions.lock().push(position);
        self.time = (self.script.length.unwrap_or(0) as f64 * position) as Micros;
        Ok(())
    }

    fn set_next_demux_time(&mut self, time: Micros) -> Result<()> {
        if !self.script.catch_up {
            return Err(PlayerError::Unsupported("set_next_demux_time"));
        }
        self.time = self.time.max(time);
        Ok(())
    }

    fn titles(&self) -> Option<TitleTable> {
        self.script.titles.clone()
    }

    fn set_title(&mut self, index: usize) -> Result<()> {
        self.probe.titles.lock().push(index);
        Ok(())
    }

    fn set_seekpoint(&mut self, index: usize) -> Result<()> {
        self.probe.seekpoints.lock().push(index);
        self.seekpoint = Some(index);
        Ok(())
    }

    fn can_seek(&self) -> bool {
        self.script.can_seek
    }

    fn can_pause(&self) -> bool {
        self.script.can_pause
    }

    fn can_control_pace(&self) -> bool {
        self.script.can_pace
    }

    fn can_control_rate(&self) -> bool {
        self.script.can_rate
    }

    fn rescale_ts(&self) -> bool {
        self.script.can_rate
    }

    fn set_pause_state(&mut self, paused: bool) -> Result<()> {
        self.probe.pauses.lock().push(paused);
        if !paused && self.script.fail_resume {
            return Err(PlayerError::Other("scripted resume failure".into()));
        }
        Ok(())
    }

    fn set_rate(&mut self, rate: i32) -> Result<i32> {
        self.probe.rates.lock().push(rate);
        Ok(rate)
    }

    fn meta(&self) -> Vec<(String, String)> {
        self.script.meta.clone()
    }
}

/// 按路径分发模拟源的注册表；字节流访问和解复用交给内置模块
#[derive(Default)]
pub struct MockRegistry {
    sources: Mutex<HashMap<String, (MockScript, Arc<Probe>)>>,
    attempts: Mutex<Vec<String>>,
    builtin: BuiltinRegistry,
}

impl MockRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 注册一个模拟源，返回它的调用记录
    pub fn add(&self, path: &str, script: MockScript) -> Arc<Probe> {
        let probe = Arc::new(Probe::default());
        self.sources.lock().insert(path.to_string(), (script, probe.clone()));
        probe
    }

    /// 依次尝试打开的路径
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().clone()
    }
}

impl ModuleRegistry for MockRegistry {
    fn open_access_demux(&self, _access: &str, _demux: &str, path: &str, _ctx: &OpenContext) -> Result<Box<dyn Demux>> {
        self.attempts.lock().push(path.to_string());
        match self.sources.lock().get(path) {
            Some((script, probe)) => Ok(Box::new(MockDemux::new(script.clone(), probe.clone()))),
            None => Err(PlayerError::Unsupported("mock access_demux")),
        }
    }

    fn open_access(&self, access: &str, path: &str, ctx: &OpenContext) -> Result<Box<dyn Access>> {
        self.builtin.open_access(access, path, ctx)
    }

    fn open_demux(&self, demux: &str, path: &str, stream: BufferedStream, ctx: &OpenContext) -> Result<Box<dyn Demux>> {
        self.builtin.open_demux(demux, path, stream, ctx)
    }
}

/// 轮询会话状态直到满足条件或超时
pub fn wait_for<F>(session: &Session, timeout: Duration, pred: F) -> Option<StatusSnapshot>
where
    F: Fn(&StatusSnapshot) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        let status = session.status();
        if pred(&status) {
            return Some(status);
        }
        if Instant::now() >= deadline {
            return None;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}
