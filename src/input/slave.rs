use crate::core::{log_ctx, Micros, SeekTarget};
use crate::source::{DemuxStatus, SourceHandle};
use log::{debug, warn};

/// 从属源集合，跟随主源时间推进
///
/// 从属源的任何失败都只会把它标记为 EOF，不会影响主源。
pub struct SlaveSet {
    label: String,
    slaves: Vec<SourceHandle>,
}

impl SlaveSet {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            slaves: Vec::new(),
        }
    }

    pub fn push(&mut self, slave: SourceHandle) {
        self.slaves.push(slave);
    }

    pub fn len(&self) -> usize {
        self.slaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slaves.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceHandle> {
        self.slaves.iter()
    }

    pub fn eof_count(&self) -> usize {
        self.slaves.iter().filter(|s| s.eof()).count()
    }

    /// 把每个未结束的从属源推进到主源时间，返回本次新结束的个数
    pub fn advance(&mut self, master_time: Micros) -> usize {
        let mut ended = 0;
        for (i, slave) in self.slaves.iter_mut().enumerate() {
            if slave.eof() {
                continue;
            }
            let alive = if slave.set_next_demux_time(master_time).is_ok() {
                matches!(slave.read(), Ok(DemuxStatus::Continue))
            } else {
                catch_up(slave, master_time)
            };
            if !alive {
                debug!("{} 从属源 {} 结束", log_ctx(&self.label), i);
                slave.set_eof(true);
                ended += 1;
            }
        }
        ended
    }

    /// 主源跳转后，所有从属源直接跳到主源时间；失败的标记为 EOF
    pub fn seek_all(&mut self, master_time: Micros) {
        for (i, slave) in self.slaves.iter_mut().enumerate() {
            match slave.seek(SeekTarget::Time(master_time)) {
                Ok(()) => slave.set_eof(false),
                Err(e) => {
                    if !slave.eof() {
                        warn!("{} ⚠ 从属源 {} 跳转失败，标记为结束: {}", log_ctx(&self.label), i, e);
                    }
                    slave.set_eof(true);
                }
            }
        }
    }

    pub fn pts_delays(&self) -> Vec<Micros> {
        self.slaves.iter().map(|s| s.pts_delay()).collect()
    }

    pub fn bytes_read(&self) -> u64 {
        self.slaves.iter().map(|s| s.bytes_read()).sum()
    }

    pub fn cancel_all(&self) {
        for slave in &self.slaves {
            slave.cancel();
        }
    }

    pub fn close_all(&mut self) {
        for slave in &mut self.slaves {
            slave.close();
        }
    }
}

/// 反复读取直到从属源时间追上主源；时间未知或读到结束返回 false
fn catch_up(slave: &mut SourceHandle, master_time: Micros) -> bool {
    loop {
        match slave.time() {
            Some(time) if time >= master_time => return true,
            Some(_) => {}
            None => return false,
        }
        match slave.read() {
            Ok(DemuxStatus::Continue) => {}
            _ => return false,
        }
    }
}
