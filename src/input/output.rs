use crate::core::{MediaPacket, Micros, PacketType, Result, RATE_DEFAULT};
use crossbeam::queue::SegQueue;
use parking_lot::Mutex;

/// 基本流输出端（解码/渲染一侧）
///
/// 解复用器与输入线程共享同一个输出端，所以方法都取 `&self`。
pub trait OutputSink: Send + Sync {
    /// 送出一个媒体包
    fn send(&self, packet: MediaPacket) -> Result<()>;

    /// 跳转前清空解码状态和已排队的数据
    fn flush(&self);

    fn set_pause_state(&self, paused: bool);

    /// 速率变化后重新缩放已排队的时间戳
    fn set_rate(&self, rate: i32);

    fn select_program(&self, program: i32) -> Result<()>;

    /// 负数表示取消选择对应的流
    fn select_es(&self, es_id: i32) -> Result<()>;

    fn set_delay(&self, kind: PacketType, delay: Micros);

    /// 下游是否已经消费完所有数据
    fn is_drained(&self) -> bool {
        true
    }

    fn sample_rate(&self) -> Option<u32> {
        None
    }
}

/// 丢弃一切的输出端
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn send(&self, _packet: MediaPacket) -> Result<()> {
        Ok(())
    }

    fn flush(&self) {}

    fn set_pause_state(&self, _paused: bool) {}

    fn set_rate(&self, _rate: i32) {}

    fn select_program(&self, _program: i32) -> Result<()> {
        Ok(())
    }

    fn select_es(&self, _es_id: i32) -> Result<()> {
        Ok(())
    }

    fn set_delay(&self, _kind: PacketType, _delay: Micros) {}
}

/// 输出端收到的控制，按到达顺序记录
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Flush,
    Pause(bool),
    Rate(i32),
    Program(i32),
    Es(i32),
    Delay(PacketType, Micros),
}

#[derive(Debug)]
struct SinkState {
    paused: bool,
    rate: i32,
    program: i32,
    selected_es: Vec<i32>,
    audio_delay: Micros,
    spu_delay: Micros,
    events: Vec<SinkEvent>,
}

/// 把包放进无锁队列的输出端，消费者自行 `pop`
pub struct QueueSink {
    packets: SegQueue<MediaPacket>,
    state: Mutex<SinkState>,
    sample_rate: Option<u32>,
}

impl QueueSink {
    pub fn new() -> Self {
        Self {
            packets: SegQueue::new(),
            state: Mutex::new(SinkState {
                paused: false,
                rate: RATE_DEFAULT,
                program: 0,
                selected_es: Vec::new(),
                audio_delay: 0,
                spu_delay: 0,
                events: Vec::new(),
            }),
            sample_rate: None,
        }
    }

    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    pub fn pop(&self) -> Option<MediaPacket> {
        self.packets.pop()
    }

    pub fn packet_count(&self) -> usize {
        self.packets.len()
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    pub fn rate(&self) -> i32 {
        self.state.lock().rate
    }

    pub fn program(&self) -> i32 {
        self.state.lock().program
    }

    pub fn selected_es(&self) -> Vec<i32> {
        self.state.lock().selected_es.clone()
    }

    pub fn delay(&self, kind: PacketType) -> Micros {
        let state = self.state.lock();
        match kind {
            PacketType::Subtitle => state.spu_delay,
            _ => state.audio_delay,
        }
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.state.lock().events.clone()
    }

    pub fn flush_count(&self) -> usize {
        self.state
            .lock()
            .events
            .iter()
            .filter(|e| matches!(e, SinkEvent::Flush))
            .count()
    }
}

impl Default for QueueSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink for QueueSink {
    fn send(&self, packet: MediaPacket) -> Result<()> {
        self.packets.push(packet);
        Ok(())
    }

    fn flush(&self) {
        while self.packets.pop().is_some() {}
        self.state.lock().events.push(SinkEvent::Flush);
    }

    fn set_pause_state(&self, paused: bool) {
        let mut state = self.state.lock();
        state.paused = paused;
        state.events.push(SinkEvent::Pause(paused));
    }

    fn set_rate(&self, rate: i32) {
        let mut state = self.state.lock();
        state.rate = rate;
        state.events.push(SinkEvent::Rate(rate));
    }

    fn select_program(&self, program: i32) -> Result<()> {
        let mut state = self.state.lock();
        state.program = program;
        state.events.push(SinkEvent::Program(program));
        Ok(())
    }

    fn select_es(&self, es_id: i32) -> Result<()> {
        let mut state = self.state.lock();
        if es_id < 0 {
            state.selected_es.retain(|id| *id != -es_id);
        } else if !state.selected_es.contains(&es_id) {
            state.selected_es.push(es_id);
        }
        state.events.push(SinkEvent::Es(es_id));
        Ok(())
    }

    fn set_delay(&self, kind: PacketType, delay: Micros) {
        let mut state = self.state.lock();
        match kind {
            PacketType::Subtitle => state.spu_delay = delay,
            _ => state.audio_delay = delay,
        }
        state.events.push(SinkEvent::Delay(kind, delay));
    }

    fn is_drained(&self) -> bool {
        self.packets.is_empty()
    }

    fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_drops_queued_packets() {
        let sink = QueueSink::new();
        sink.send(MediaPacket::subtitle(1, 0, 10, "a")).unwrap();
        sink.send(MediaPacket::subtitle(1, 10, 10, "b")).unwrap();
        assert!(!sink.is_drained());
        sink.flush();
        assert!(sink.is_drained());
        assert_eq!(sink.flush_count(), 1);
    }

    #[test]
    fn test_negative_es_unselects() {
        let sink = QueueSink::new();
        sink.select_es(3).unwrap();
        sink.select_es(5).unwrap();
        sink.select_es(-3).unwrap();
        assert_eq!(sink.selected_es(), vec![5]);
    }
}
