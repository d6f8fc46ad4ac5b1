use crate::core::{log_ctx, MediaPacket, Micros, PlayerError, Result, MILLISECOND};
use crate::input::output::OutputSink;
use crate::source::module::{Demux, DemuxStatus, OpenContext};
use crate::source::stream::BufferedStream;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// 支持的字幕扩展名
pub const SUBTITLE_EXTENSIONS: [&str; 4] = ["srt", "ass", "ssa", "vtt"];

/// 常见的语言后缀：movie.zh.srt
const LANGUAGE_TAGS: [&str; 9] = ["zh", "en", "chs", "cht", "zh-cn", "zh-tw", "ja", "ko", "chs-eng"];

/// 文件名里没有区分度的词
const NOISE_WORDS: [&str; 23] = [
    "web", "dl", "ddp", "atmos", "h264", "h265", "mkv", "mp4", "avi", "1080p", "2160p", "720p", "480p", "bluray",
    "bdrip", "webrip", "x264", "x265", "aac", "ac3", "dts", "flac", "mp3",
];

/// 字幕基本流 id 从这里开始分配
static NEXT_SUBTITLE_ES: AtomicI32 = AtomicI32::new(0x1000);

/// 一条字幕
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub start: Micros,
    pub end: Micros,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleFormat {
    SubRip,
    Ass,
    WebVtt,
}

impl SubtitleFormat {
    /// 先看扩展名，再看内容特征
    pub fn detect(path: &str, content: &str) -> Option<Self> {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("srt") => return Some(Self::SubRip),
            Some("ass") | Some("ssa") => return Some(Self::Ass),
            Some("vtt") => return Some(Self::WebVtt),
            _ => {}
        }
        let head = content.trim_start_matches('\u{feff}').trim_start();
        if head.starts_with("WEBVTT") {
            Some(Self::WebVtt)
        } else if head.starts_with("[Script Info]") || content.contains("[Events]") {
            Some(Self::Ass)
        } else if content.lines().any(|l| l.contains("-->") && l.contains(',')) {
            Some(Self::SubRip)
        } else {
            None
        }
    }

    pub fn parse(self, content: &str) -> Vec<Cue> {
        match self {
            Self::SubRip => parse_srt(content),
            Self::Ass => parse_ass(content),
            Self::WebVtt => parse_vtt(content),
        }
    }
}

/// 文本字幕解复用器
///
/// 整个文件在打开时解析完，`demux` 每次发出一条字幕；
/// 设置了追赶时间时，一次发出所有开始时间不晚于该时间的字幕。
pub struct SubtitleDemux {
    label: String,
    out: Arc<dyn OutputSink>,
    es_id: i32,
    format: SubtitleFormat,
    cues: Vec<Cue>,
    next: usize,
    time: Micros,
    next_demux_time: Option<Micros>,
}

impl SubtitleDemux {
    pub fn open(path: &str, mut stream: BufferedStream, ctx: &OpenContext) -> Result<Self> {
        let data = stream.read_all()?;
        let content = String::from_utf8_lossy(&data);
        let format = SubtitleFormat::detect(path, &content)
            .ok_or_else(|| PlayerError::Unsupported("无法识别的字幕格式"))?;
        Self::from_cues(format, format.parse(&content), ctx)
    }

    pub fn from_cues(format: SubtitleFormat, mut cues: Vec<Cue>, ctx: &OpenContext) -> Result<Self> {
        if cues.is_empty() {
            return Err(PlayerError::OpenError("字幕文件中没有可用条目".into()));
        }
        cues.sort_by_key(|c| c.start);
        info!("{} 📝 字幕已解析: {:?}，共 {} 条", log_ctx(&ctx.label), format, cues.len());
        Ok(Self {
            label: ctx.label.clone(),
            out: ctx.out.clone(),
            es_id: NEXT_SUBTITLE_ES.fetch_add(1, Ordering::Relaxed),
            format,
            cues,
            next: 0,
            time: 0,
            next_demux_time: None,
        })
    }

    pub fn format(&self) -> SubtitleFormat {
        self.format
    }

    fn send_cue(&mut self, index: usize) -> Result<()> {
        let cue = &self.cues[index];
        let packet = MediaPacket::subtitle(self.es_id, cue.start, cue.end - cue.start, &cue.text);
        self.out.send(packet)
    }
}

impl Demux for SubtitleDemux {
    fn demux(&mut self) -> Result<DemuxStatus> {
        match self.next_demux_time.take() {
            Some(target) => {
                while self.next < self.cues.len() && self.cues[self.next].start <= target {
                    self.send_cue(self.next)?;
                    self.next += 1;
                }
                self.time = self.time.max(target);
            }
            None => {
                if self.next < self.cues.len() {
                    self.send_cue(self.next)?;
                    self.time = self.cues[self.next].start;
                    self.next += 1;
                }
            }
        }
        if self.next >= self.cues.len() {
            debug!("{} 字幕已全部发出", log_ctx(&self.label));
            return Ok(DemuxStatus::Eof);
        }
        Ok(DemuxStatus::Continue)
    }

    fn time(&self) -> Option<Micros> {
        Some(self.time)
    }

    fn length(&self) -> Option<Micros> {
        self.cues.iter().map(|c| c.end).max()
    }

    fn set_time(&mut self, time: Micros) -> Result<()> {
        // 按开始时间排序，结束时间无序：顺序找第一条尚未开始或尚未结束的字幕
        self.next = self
            .cues
            .iter()
            .position(|c| c.start > time || c.end > time)
            .unwrap_or(self.cues.len());
        self.time = time.max(0);
        Ok(())
    }

    fn set_position(&mut self, position: f64) -> Result<()> {
        let length = self.length().unwrap_or(0);
        self.set_time((length as f64 * position.clamp(0.0, 1.0)) as Micros)
    }

    fn set_next_demux_time(&mut self, time: Micros) -> Result<()> {
        self.next_demux_time = Some(time);
        Ok(())
    }

    fn can_seek(&self) -> bool {
        true
    }
}

/// SRT：序号行、`00:01:30,500 --> 00:01:33,400`、文本、空行
pub fn parse_srt(content: &str) -> Vec<Cue> {
    parse_blocks(content, parse_srt_timestamp)
}

/// WebVTT：与 SRT 类似，毫秒用 '.' 分隔，小时可省略
pub fn parse_vtt(content: &str) -> Vec<Cue> {
    let mut lines = content.lines();
    match lines.next() {
        Some(first) if first.trim_start_matches('\u{feff}').trim().starts_with("WEBVTT") => {}
        _ => warn!("VTT 文件缺少 WEBVTT 头部"),
    }
    let body: Vec<&str> = lines.collect();
    parse_blocks(&body.join("\n"), parse_vtt_timestamp)
}

fn parse_blocks(content: &str, timestamp: fn(&str) -> Option<Micros>) -> Vec<Cue> {
    let mut cues = Vec::new();
    let mut current: Option<Cue> = None;

    let mut flush = |current: &mut Option<Cue>| {
        if let Some(mut cue) = current.take() {
            cue.text = cue.text.trim().to_string();
            if !cue.text.is_empty() {
                cues.push(cue);
            }
        }
    };

    for (number, raw) in content.lines().enumerate() {
        let line = raw.trim().trim_start_matches('\u{feff}');
        if line.is_empty() {
            flush(&mut current);
            continue;
        }
        if line.contains("-->") {
            flush(&mut current);
            match parse_time_line(line, timestamp) {
                Some((start, end)) => {
                    current = Some(Cue {
                        start,
                        end,
                        text: String::new(),
                    })
                }
                None => warn!("无法解析时间行 (第{}行): {}", number + 1, line),
            }
            continue;
        }
        match current.as_mut() {
            Some(cue) => {
                if !cue.text.is_empty() {
                    cue.text.push('\n');
                }
                cue.text.push_str(line);
            }
            // 时间行之前的序号、NOTE、STYLE 等
            None => {}
        }
    }
    flush(&mut current);
    cues
}

fn parse_time_line(line: &str, timestamp: fn(&str) -> Option<Micros>) -> Option<(Micros, Micros)> {
    let (start, rest) = line.split_once("-->")?;
    // VTT 时间后面可能跟着 cue 设置
    let end = rest.split_whitespace().next()?;
    let start = timestamp(start.trim())?;
    let end = timestamp(end)?;
    Some((start, end.max(start)))
}

fn hms(h: &str, m: &str, s: &str) -> Option<Micros> {
    let h: i64 = h.parse().ok()?;
    let m: i64 = m.parse().ok()?;
    let s: i64 = s.parse().ok()?;
    Some(((h * 60 + m) * 60 + s) * 1000 * MILLISECOND)
}

/// `HH:MM:SS,mmm`
fn parse_srt_timestamp(ts: &str) -> Option<Micros> {
    let (clock, ms) = ts.split_once(',')?;
    let mut parts = clock.split(':');
    let (h, m, s) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    Some(hms(h, m, s)? + ms.parse::<i64>().ok()? * MILLISECOND)
}

/// `HH:MM:SS.mmm` 或 `MM:SS.mmm`
fn parse_vtt_timestamp(ts: &str) -> Option<Micros> {
    let (clock, ms) = ts.split_once('.')?;
    let parts: Vec<&str> = clock.split(':').collect();
    let base = match parts.as_slice() {
        [m, s] => hms("0", m, s)?,
        [h, m, s] => hms(h, m, s)?,
        _ => return None,
    };
    Some(base + ms.parse::<i64>().ok()? * MILLISECOND)
}

/// `H:MM:SS.cc`（百分之一秒）
fn parse_ass_timestamp(ts: &str) -> Option<Micros> {
    let (clock, cs) = ts.split_once('.')?;
    let mut parts = clock.split(':');
    let (h, m, s) = (parts.next()?, parts.next()?, parts.next()?);
    Some(hms(h, m, s)? + cs.parse::<i64>().ok()? * 10 * MILLISECOND)
}

/// ASS/SSA：只取 [Events] 段里的 Dialogue 行
pub fn parse_ass(content: &str) -> Vec<Cue> {
    let mut cues = Vec::new();
    let mut in_events = false;
    for line in content.lines().map(str::trim) {
        if line.starts_with('[') && line.ends_with(']') {
            in_events = line.eq_ignore_ascii_case("[Events]");
            continue;
        }
        if !in_events {
            continue;
        }
        let Some(dialogue) = line.strip_prefix("Dialogue:") else {
            continue;
        };
        // Layer,Start,End,Style,Name,MarginL,MarginR,MarginV,Effect,Text
        let fields: Vec<&str> = dialogue.splitn(10, ',').collect();
        if fields.len() < 10 {
            continue;
        }
        let (Some(start), Some(end)) = (parse_ass_timestamp(fields[1].trim()), parse_ass_timestamp(fields[2].trim()))
        else {
            continue;
        };
        let text = strip_ass_tags(fields[9]);
        if !text.is_empty() {
            cues.push(Cue {
                start,
                end: end.max(start),
                text,
            });
        }
    }
    cues
}

/// 去掉 `{...}` 覆盖标签，`\N` / `\n` 换行，`\h` 空格
fn strip_ass_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            _ if depth > 0 => {}
            '\\' => match chars.next() {
                Some('N') | Some('n') => out.push('\n'),
                Some('h') => out.push(' '),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            },
            _ => out.push(ch),
        }
    }
    out.trim().to_string()
}

/// 在媒体文件旁边查找字幕：同名、带语言后缀，以及（开启模糊匹配且前两者都没有时）关键词匹配
pub fn find_subtitle_files(media_path: &Path, fuzzy: bool) -> Vec<PathBuf> {
    let (Some(dir), Some(stem)) = (media_path.parent(), media_path.file_stem()) else {
        return Vec::new();
    };
    let stem = stem.to_string_lossy();
    let mut found = Vec::new();

    for ext in SUBTITLE_EXTENSIONS {
        let candidate = dir.join(format!("{}.{}", stem, ext));
        if candidate.is_file() {
            debug!("同名字幕: {}", candidate.display());
            found.push(candidate);
        }
    }
    for lang in LANGUAGE_TAGS {
        for ext in SUBTITLE_EXTENSIONS {
            let candidate = dir.join(format!("{}.{}.{}", stem, lang, ext));
            if candidate.is_file() {
                debug!("语言后缀字幕: {}", candidate.display());
                found.push(candidate);
            }
        }
    }

    if found.is_empty() && fuzzy {
        let keywords = keywords(&stem);
        let needed = (keywords.len() / 2).max(1);
        if let Ok(entries) = std::fs::read_dir(dir) {
            let mut fuzzy_hits: Vec<PathBuf> = entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| is_subtitle_path(p))
                .filter(|p| {
                    let name = p.file_name().map(|n| n.to_string_lossy().to_lowercase()).unwrap_or_default();
                    keywords.iter().filter(|k| name.contains(k.as_str())).count() >= needed
                })
                .collect();
            fuzzy_hits.sort();
            found.extend(fuzzy_hits);
        }
    }

    found
}

/// 扩展名是否为已知字幕格式
pub fn is_subtitle_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUBTITLE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// 文件名关键词（小写），用于模糊匹配
fn keywords(stem: &str) -> Vec<String> {
    let words: Vec<String> = stem
        .split(['.', '-', '_', ' ', '[', ']', '(', ')'])
        .filter(|w| w.len() > 2)
        .map(str::to_lowercase)
        .filter(|w| !NOISE_WORDS.contains(&w.as_str()))
        .collect();
    if words.is_empty() {
        vec![stem.to_lowercase()]
    } else {
        words
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SECOND;
    use crate::input::output::QueueSink;
    use crate::core::CancelToken;
    use std::fs;

    const SRT: &str = "1\n00:00:01,000 --> 00:00:02,500\nHello\n\n2\n00:00:05,000 --> 00:00:06,000\nSecond\nline\n";

    fn ctx(sink: Arc<QueueSink>) -> OpenContext {
        OpenContext {
            cancel: CancelToken::new(),
            out: sink,
            label: "test".into(),
        }
    }

    #[test]
    fn test_srt_timestamps_in_micros() {
        assert_eq!(parse_srt_timestamp("00:01:30,500"), Some(90_500_000));
        assert_eq!(parse_srt_timestamp("01:23:45,123"), Some(5_025_123_000));
        assert_eq!(parse_srt_timestamp("01:23,123"), None);
    }

    #[test]
    fn test_vtt_and_ass_timestamps() {
        assert_eq!(parse_vtt_timestamp("01:30.500"), Some(90_500_000));
        assert_eq!(parse_vtt_timestamp("00:01:30.500"), Some(90_500_000));
        assert_eq!(parse_ass_timestamp("0:01:30.50"), Some(90_500_000));
    }

    #[test]
    fn test_parse_srt_blocks() {
        let cues = parse_srt(SRT);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].start, SECOND);
        assert_eq!(cues[0].end, 2_500_000);
        assert_eq!(cues[1].text, "Second\nline");
    }

    #[test]
    fn test_parse_vtt_with_settings() {
        let vtt = "WEBVTT\n\nNOTE comment\n\n00:01.000 --> 00:02.000 align:start\nHi\n";
        let cues = parse_vtt(vtt);
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].end, 2 * SECOND);
        assert_eq!(cues[0].text, "Hi");
    }

    #[test]
    fn test_parse_ass_events_only() {
        let ass = "[Script Info]\nTitle: x\n\n[Events]\nFormat: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\nDialogue: 0,0:00:01.00,0:00:03.00,Default,,0,0,0,,{\\b1}Hello{\\b0}, World\\NBye\n";
        let cues = parse_ass(ass);
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "Hello, World\nBye");
        assert_eq!(cues[0].end, 3 * SECOND);
    }

    #[test]
    fn test_strip_ass_tags() {
        assert_eq!(strip_ass_tags("{\\b1}Hello{\\b0} World"), "Hello World");
        assert_eq!(strip_ass_tags("Line 1\\NLine 2"), "Line 1\nLine 2");
    }

    #[test]
    fn test_detect_format_from_content() {
        assert_eq!(SubtitleFormat::detect("x", "WEBVTT\n"), Some(SubtitleFormat::WebVtt));
        assert_eq!(SubtitleFormat::detect("x", SRT), Some(SubtitleFormat::SubRip));
        assert_eq!(SubtitleFormat::detect("x.ass", ""), Some(SubtitleFormat::Ass));
        assert_eq!(SubtitleFormat::detect("x.bin", "garbage"), None);
    }

    #[test]
    fn test_demux_catch_up_and_seek() {
        let sink = Arc::new(QueueSink::new());
        let mut demux = SubtitleDemux::from_cues(SubtitleFormat::SubRip, parse_srt(SRT), &ctx(sink.clone())).unwrap();

        demux.set_next_demux_time(3 * SECOND).unwrap();
        assert_eq!(demux.demux().unwrap(), DemuxStatus::Continue);
        assert_eq!(sink.packet_count(), 1);
        assert_eq!(demux.time(), Some(3 * SECOND));

        demux.set_next_demux_time(10 * SECOND).unwrap();
        assert_eq!(demux.demux().unwrap(), DemuxStatus::Eof);
        assert_eq!(sink.packet_count(), 2);

        demux.set_time(2 * SECOND).unwrap();
        assert_eq!(demux.demux().unwrap(), DemuxStatus::Continue);
        assert_eq!(sink.packet_count(), 3);
    }

    #[test]
    fn test_seek_keeps_long_cue_still_on_screen() {
        let cue = |start: Micros, end: Micros, text: &str| Cue {
            start,
            end,
            text: text.into(),
        };
        let cues = vec![
            cue(0, 10 * SECOND, "long"),
            cue(SECOND, 2 * SECOND, "b"),
            cue(3 * SECOND, 4 * SECOND, "c"),
            cue(6 * SECOND, 7 * SECOND, "d"),
        ];
        let sink = Arc::new(QueueSink::new());
        let mut demux = SubtitleDemux::from_cues(SubtitleFormat::SubRip, cues, &ctx(sink.clone())).unwrap();

        demux.set_time(5 * SECOND).unwrap();
        demux.set_next_demux_time(5 * SECOND).unwrap();
        assert_eq!(demux.demux().unwrap(), DemuxStatus::Continue);

        let first = sink.pop().expect("长字幕应当仍然发出");
        assert_eq!(first.data, b"long".to_vec());
        let mut texts = vec![];
        while let Some(packet) = sink.pop() {
            texts.push(String::from_utf8(packet.data).unwrap());
        }
        assert!(!texts.contains(&"d".to_string()));

        demux.set_time(8 * SECOND).unwrap();
        demux.set_next_demux_time(8 * SECOND).unwrap();
        demux.demux().unwrap();
        assert_eq!(sink.pop().unwrap().data, b"long".to_vec());
    }

    #[test]
    fn test_find_subtitle_files() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("Movie.Name.2020.1080p.mkv");
        fs::write(&media, b"").unwrap();
        fs::write(dir.path().join("Movie.Name.2020.1080p.srt"), SRT).unwrap();
        fs::write(dir.path().join("Movie.Name.2020.1080p.zh.ass"), "").unwrap();
        fs::write(dir.path().join("unrelated.txt"), "").unwrap();

        let found = find_subtitle_files(&media, true);
        assert_eq!(found.len(), 2);
        assert!(found[0].ends_with("Movie.Name.2020.1080p.srt"));
    }

    #[test]
    fn test_find_subtitle_files_fuzzy() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("Some.Show.S01E02.WEB-DL.mkv");
        fs::write(&media, b"").unwrap();
        fs::write(dir.path().join("some show s01e02 [eng].srt"), SRT).unwrap();
        fs::write(dir.path().join("other.srt"), SRT).unwrap();

        assert!(find_subtitle_files(&media, false).is_empty());
        let found = find_subtitle_files(&media, true);
        assert_eq!(found.len(), 1);
        assert!(found[0].to_string_lossy().contains("s01e02"));
    }
}
