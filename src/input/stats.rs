use crate::core::log_ctx;
use log::{debug, info};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

/// 每个会话的输入统计
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InputStats {
    /// 主源和从属源读到的总字节数
    pub bytes_read: u64,
    /// 最近一次计算的输入码率（bit/s）
    pub input_bitrate: u64,
    pub demux_calls: u64,
    pub slave_eof: usize,
}

impl InputStats {
    fn accumulate(&mut self, other: &InputStats) {
        self.bytes_read += other.bytes_read;
        self.input_bitrate += other.input_bitrate;
        self.demux_calls += other.demux_calls;
        self.slave_eof += other.slave_eof;
    }
}

/// 码率计算用的采样
#[derive(Debug)]
pub struct BitrateMeter {
    last_bytes: u64,
    last_at: Instant,
}

impl BitrateMeter {
    pub fn new() -> Self {
        Self {
            last_bytes: 0,
            last_at: Instant::now(),
        }
    }

    /// 根据总字节数更新，返回这段时间的 bit/s
    pub fn sample(&mut self, total_bytes: u64) -> u64 {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_at).as_secs_f64();
        let delta = total_bytes.saturating_sub(self.last_bytes);
        self.last_bytes = total_bytes;
        self.last_at = now;
        if elapsed <= 0.0 {
            return 0;
        }
        (delta as f64 * 8.0 / elapsed) as u64
    }
}

impl Default for BitrateMeter {
    fn default() -> Self {
        Self::new()
    }
}

struct HubEntry {
    id: u64,
    label: String,
    stats: Arc<Mutex<InputStats>>,
}

#[derive(Default)]
struct HubInner {
    next_id: u64,
    entries: Vec<HubEntry>,
    aggregator: Option<u64>,
}

/// 进程级统计中心
///
/// 明确指定一个会话负责汇总全局统计；该会话结束时交给下一个仍在注册的会话。
#[derive(Default)]
pub struct StatsHub {
    inner: Mutex<HubInner>,
}

impl StatsHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 默认的进程级实例
    pub fn global() -> Arc<StatsHub> {
        static GLOBAL: OnceLock<Arc<StatsHub>> = OnceLock::new();
        GLOBAL.get_or_init(StatsHub::new).clone()
    }

    pub fn register(self: &Arc<Self>, label: &str, stats: Arc<Mutex<InputStats>>) -> StatsRegistration {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.entries.push(HubEntry {
            id,
            label: label.to_string(),
            stats,
        });
        if inner.aggregator.is_none() {
            info!("{} 📊 成为全局统计汇总者", log_ctx(label));
            inner.aggregator = Some(id);
        }
        StatsRegistration {
            hub: self.clone(),
            id,
            label: label.to_string(),
        }
    }

    fn unregister(&self, id: u64) {
        let mut inner = self.inner.lock();
        inner.entries.retain(|e| e.id != id);
        if inner.aggregator == Some(id) {
            inner.aggregator = inner.entries.first().map(|e| e.id);
            if let Some(next) = inner.entries.first() {
                info!("{} 📊 接手全局统计汇总", log_ctx(&next.label));
            }
        }
    }

    pub fn is_aggregator(&self, id: u64) -> bool {
        self.inner.lock().aggregator == Some(id)
    }

    pub fn aggregator_label(&self) -> Option<String> {
        let inner = self.inner.lock();
        let id = inner.aggregator?;
        inner.entries.iter().find(|e| e.id == id).map(|e| e.label.clone())
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// 汇总所有会话的统计
    pub fn aggregate(&self) -> InputStats {
        let inner = self.inner.lock();
        let mut total = InputStats::default();
        for entry in &inner.entries {
            total.accumulate(&entry.stats.lock());
        }
        total
    }
}

/// 会话在统计中心的登记，drop 时注销并移交汇总职责
pub struct StatsRegistration {
    hub: Arc<StatsHub>,
    id: u64,
    label: String,
}

impl StatsRegistration {
    pub fn is_aggregator(&self) -> bool {
        self.hub.is_aggregator(self.id)
    }

    /// 如果本会话是汇总者，计算全局统计
    pub fn aggregate_if_designated(&self) -> Option<InputStats> {
        if !self.is_aggregator() {
            return None;
        }
        let total = self.hub.aggregate();
        debug!("{} 📊 全局统计: {:?}", log_ctx(&self.label), total);
        Some(total)
    }
}

impl Drop for StatsRegistration {
    fn drop(&mut self) {
        self.hub.unregister(self.id);
    }
}
