use crate::core::{ms_to_micros, secs_to_micros, Micros, PlayerError, Result};
use log::warn;
use serde::{Deserialize, Serialize};

/// 默认缓冲延迟（毫秒）
pub const DEFAULT_CACHING_MS: i64 = 300;

/// 到达结尾后的重复策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Repeat {
    Times(u32),
    Forever,
}

impl Default for Repeat {
    fn default() -> Self {
        Repeat::Times(0)
    }
}

impl Repeat {
    pub fn is_active(&self) -> bool {
        !matches!(self, Repeat::Times(0))
    }

    /// 消耗一次重复机会；没有剩余时返回 false
    pub fn consume(&mut self) -> bool {
        match self {
            Repeat::Forever => true,
            Repeat::Times(0) => false,
            Repeat::Times(n) => {
                *n -= 1;
                true
            }
        }
    }
}

/// 会话选项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    pub repeat: Repeat,
    /// 秒，0 表示不设置
    pub start_time: f64,
    pub stop_time: f64,
    pub run_time: f64,
    /// 倍速，1.0 为正常
    pub rate: f64,
    /// 强制的解复用模块
    pub demux: String,
    pub sub_file: Option<String>,
    pub sub_autodetect: bool,
    pub sub_autodetect_fuzzy: bool,
    /// 额外的从属源
    pub slaves: Vec<String>,
    pub bookmarks: Option<String>,
    /// 毫秒
    pub caching: i64,
    /// 毫秒
    pub audio_desync: i64,
    pub out_pace_control: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            repeat: Repeat::default(),
            start_time: 0.0,
            stop_time: 0.0,
            run_time: 0.0,
            rate: 1.0,
            demux: String::new(),
            sub_file: None,
            sub_autodetect: true,
            sub_autodetect_fuzzy: true,
            slaves: Vec::new(),
            bookmarks: None,
            caching: DEFAULT_CACHING_MS,
            audio_desync: 0,
            out_pace_control: false,
        }
    }
}

impl SessionOptions {
    pub fn start(&self) -> Micros {
        secs_to_micros(self.start_time)
    }

    pub fn stop(&self) -> Micros {
        secs_to_micros(self.stop_time)
    }

    pub fn run(&self) -> Micros {
        secs_to_micros(self.run_time)
    }

    pub fn caching_micros(&self) -> Micros {
        ms_to_micros(self.caching)
    }

    pub fn audio_desync_micros(&self) -> Micros {
        ms_to_micros(self.audio_desync)
    }

    /// 应用条目选项，错误的选项记录警告后跳过
    pub fn apply_item_options<S: AsRef<str>>(&mut self, options: &[S]) {
        for option in options {
            if let Err(e) = self.apply_option(option.as_ref()) {
                warn!("⚠ 忽略条目选项 '{}': {}", option.as_ref(), e);
            }
        }
    }

    /// 解析并应用一条 `[:]key[=value]` / `[:]no-key` 形式的选项
    pub fn apply_option(&mut self, option: &str) -> Result<()> {
        let option = option.trim().trim_start_matches(':');
        let (key, value) = match option.split_once('=') {
            Some((k, v)) => (k.trim(), Some(v.trim())),
            None => (option, None),
        };
        let (key, negated) = match key.strip_prefix("no-") {
            Some(rest) => (rest, true),
            None => (key, false),
        };

        match key {
            "start-time" => self.start_time = parse_float(key, value)?,
            "stop-time" => self.stop_time = parse_float(key, value)?,
            "run-time" => self.run_time = parse_float(key, value)?,
            "rate" => {
                let rate = parse_float(key, value)?;
                if rate <= 0.0 {
                    return Err(PlayerError::OptionError(format!("rate 必须为正数: {}", rate)));
                }
                self.rate = rate;
            }
            "repeat" | "input-repeat" => {
                self.repeat = if negated {
                    Repeat::Times(0)
                } else {
                    match value {
                        Some("forever") | Some("-1") => Repeat::Forever,
                        _ => Repeat::Times(parse_int(key, value)?.max(0) as u32),
                    }
                }
            }
            "demux" => self.demux = require(key, value)?.to_string(),
            "sub-file" => self.sub_file = Some(require(key, value)?.to_string()),
            "sub-autodetect" | "sub-autodetect-file" => self.sub_autodetect = parse_bool(key, value, negated)?,
            "sub-autodetect-fuzzy" => self.sub_autodetect_fuzzy = parse_bool(key, value, negated)?,
            "input-slave" | "slave" => {
                let locators = require(key, value)?;
                self.slaves
                    .extend(locators.split('#').filter(|s| !s.is_empty()).map(str::to_string));
            }
            "bookmarks" => self.bookmarks = Some(require(key, value)?.to_string()),
            "caching" | "file-caching" | "network-caching" => self.caching = parse_int(key, value)?.max(0),
            "audio-desync" => self.audio_desync = parse_int(key, value)?,
            "out-pace-control" => self.out_pace_control = parse_bool(key, value, negated)?,
            _ => return Err(PlayerError::OptionError(format!("未知选项: {}", key))),
        }
        Ok(())
    }
}

fn require<'a>(key: &str, value: Option<&'a str>) -> Result<&'a str> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PlayerError::OptionError(format!("{} 缺少取值", key)))
}

fn parse_float(key: &str, value: Option<&str>) -> Result<f64> {
    let value = require(key, value)?;
    value
        .parse()
        .map_err(|_| PlayerError::OptionError(format!("{} 不是数字: {}", key, value)))
}

fn parse_int(key: &str, value: Option<&str>) -> Result<i64> {
    let value = require(key, value)?;
    value
        .parse()
        .map_err(|_| PlayerError::OptionError(format!("{} 不是整数: {}", key, value)))
}

fn parse_bool(key: &str, value: Option<&str>, negated: bool) -> Result<bool> {
    let flag = match value {
        None => true,
        Some("1") | Some("true") | Some("yes") => true,
        Some("0") | Some("false") | Some("no") => false,
        Some(other) => {
            return Err(PlayerError::OptionError(format!("{} 不是布尔值: {}", key, other)));
        }
    };
    Ok(flag != negated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_options_override_defaults() {
        let mut options = SessionOptions::default();
        options.apply_item_options(&[
            ":start-time=12.5",
            "repeat=3",
            ":no-sub-autodetect-file",
            "input-slave=a.srt#b.srt",
            "bookmarks={name=a,time=1}",
        ]);
        assert_eq!(options.start(), 12_500_000);
        assert_eq!(options.repeat, Repeat::Times(3));
        assert!(!options.sub_autodetect);
        assert_eq!(options.slaves, vec!["a.srt".to_string(), "b.srt".to_string()]);
        assert_eq!(options.bookmarks.as_deref(), Some("{name=a,time=1}"));
    }

    #[test]
    fn test_bad_options_are_reported() {
        let mut options = SessionOptions::default();
        assert!(options.apply_option("start-time=abc").is_err());
        assert!(options.apply_option("mystery=1").is_err());
        assert!(options.apply_option("rate=0").is_err());
        assert!(options.apply_option("sub-file").is_err());
        // 出错的选项不改变原值
        assert_eq!(options, SessionOptions::default());
    }

    #[test]
    fn test_repeat_forever_and_consume() {
        let mut options = SessionOptions::default();
        options.apply_option("repeat=-1").unwrap();
        assert_eq!(options.repeat, Repeat::Forever);

        let mut repeat = Repeat::Times(2);
        assert!(repeat.consume());
        assert!(repeat.consume());
        assert!(!repeat.consume());
        assert!(!repeat.is_active());
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: SessionOptions = serde_json::from_str(r#"{"repeat":{"times":2},"rate":2.0}"#).unwrap();
        assert_eq!(options.repeat, Repeat::Times(2));
        assert_eq!(options.rate, 2.0);
        assert_eq!(options.caching, DEFAULT_CACHING_MS);
    }
}
