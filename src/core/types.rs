use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 时间单位：有符号微秒（偏移量可以为负）
pub type Micros = i64;

/// 一秒对应的微秒数
pub const SECOND: Micros = 1_000_000;

/// 一毫秒对应的微秒数
pub const MILLISECOND: Micros = 1_000;

/// 毫秒转微秒
pub fn ms_to_micros(ms: i64) -> Micros {
    ms.saturating_mul(MILLISECOND)
}

/// 秒（浮点）转微秒，非正数视为未设置
pub fn secs_to_micros(secs: f64) -> Micros {
    if secs > 0.0 {
        (secs * SECOND as f64) as Micros
    } else {
        0
    }
}

/// 播放会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Initializing,
    Opening,
    Buffering,
    Playing,
    Paused,
    Ended,
    Error,
}

impl PlaybackState {
    /// 会话是否已经终结（不会再回到播放）
    pub fn is_terminal(self) -> bool {
        matches!(self, PlaybackState::Ended | PlaybackState::Error)
    }
}

/// SetState 命令可请求的目标状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestedState {
    Playing,
    Paused,
}

/// 跳转目标
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeekTarget {
    /// 0.0 - 1.0
    Position(f64),
    /// 绝对时间（微秒）
    Time(Micros),
}

/// Packet 类型（同时用作基本流类别）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketType {
    Video,
    Audio,
    Subtitle,
}

/// 媒体包（由解复用器发往输出端）
#[derive(Debug, Clone)]
pub struct MediaPacket {
    pub es_id: i32,
    pub packet_type: PacketType,
    pub pts: Micros,
    pub duration: Micros,
    pub data: Vec<u8>,
}

impl MediaPacket {
    /// 构造字幕包，文本以 UTF-8 存放
    pub fn subtitle(es_id: i32, pts: Micros, duration: Micros, text: &str) -> Self {
        Self {
            es_id,
            packet_type: PacketType::Subtitle,
            pts,
            duration,
            data: text.as_bytes().to_vec(),
        }
    }
}

/// 播放条目：定位符 + 日志标签 + 条目选项
#[derive(Debug, Clone, Default)]
pub struct MediaItem {
    /// 原始定位符（MRL）
    pub uri: String,
    /// 日志/显示用的标签
    pub name: String,
    /// 条目级选项，如 ":start-time=10"
    pub options: Vec<String>,
}

impl MediaItem {
    pub fn new(uri: impl Into<String>) -> Self {
        let uri = uri.into();
        Self {
            name: uri.clone(),
            uri,
            options: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        self.options.push(option.into());
        self
    }
}

/// 额外元数据集合上限
pub const META_LIMIT: usize = 64;

/// 有上限的元数据集合（键按字典序）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaSet {
    entries: BTreeMap<String, String>,
}

impl MetaSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入或覆盖；达到上限后新键被丢弃，返回是否写入
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        if !self.entries.contains_key(&key) && self.entries.len() >= META_LIMIT {
            return false;
        }
        self.entries.insert(key, value.into());
        true
    }

    /// 合并另一组元数据，返回实际写入的条数
    pub fn merge<I>(&mut self, items: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut written = 0;
        for (key, value) in items {
            if self.insert(key, value) {
                written += 1;
            }
        }
        written
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_set_is_bounded() {
        let mut meta = MetaSet::new();
        for i in 0..META_LIMIT + 10 {
            meta.insert(format!("key{:03}", i), "v");
        }
        assert_eq!(meta.len(), META_LIMIT);
        // 已存在的键仍可覆盖
        assert!(meta.insert("key000", "new"));
        assert_eq!(meta.get("key000"), Some("new"));
        assert!(!meta.insert("overflow", "x"));
    }

    #[test]
    fn test_secs_to_micros_ignores_non_positive() {
        assert_eq!(secs_to_micros(1.5), 1_500_000);
        assert_eq!(secs_to_micros(0.0), 0);
        assert_eq!(secs_to_micros(-3.0), 0);
    }

    #[test]
    fn test_terminal_states() {
        assert!(PlaybackState::Ended.is_terminal());
        assert!(PlaybackState::Error.is_terminal());
        assert!(!PlaybackState::Paused.is_terminal());
    }
}
