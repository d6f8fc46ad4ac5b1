use serde::{Deserialize, Serialize};

/// `@title:chapter-title:chapter` 后缀给出的播放区段（外部显示用的编号）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionRange {
    pub start_title: Option<usize>,
    pub start_seekpoint: Option<usize>,
    pub end_title: Option<usize>,
    pub end_seekpoint: Option<usize>,
}

impl SectionRange {
    pub fn is_empty(&self) -> bool {
        *self == SectionRange::default()
    }

    /// 解析 `[title][:seekpoint][-[title][:seekpoint]]`
    fn parse(spec: &str) -> Self {
        let (start, end) = match spec.split_once('-') {
            Some((start, end)) => (start, Some(end)),
            None => (spec, None),
        };
        let (start_title, start_seekpoint) = parse_pair(start);
        let (end_title, end_seekpoint) = end.map(parse_pair).unwrap_or((None, None));
        Self {
            start_title,
            start_seekpoint,
            end_title,
            end_seekpoint,
        }
    }
}

fn parse_pair(part: &str) -> (Option<usize>, Option<usize>) {
    let (title, seekpoint) = match part.split_once(':') {
        Some((t, s)) => (t, Some(s)),
        None => (part, None),
    };
    (title.parse().ok(), seekpoint.and_then(|s| s.parse().ok()))
}

/// 定位符（MRL）：`[access[/demux]:][//]path[@section]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Locator {
    pub access: String,
    pub demux: String,
    pub path: String,
    pub section: SectionRange,
    /// 去掉区段后缀后的原始字符串
    pub raw: String,
}

impl Locator {
    pub fn parse(mrl: &str) -> Self {
        let (raw, section) = split_section(mrl);
        let (access, demux, path) = split_access(raw);
        Self {
            access,
            demux,
            path,
            section,
            raw: raw.to_string(),
        }
    }

    /// 整个字符串视为不透明路径，不带 access/demux 提示
    pub fn opaque(mrl: &str) -> Self {
        let (raw, section) = split_section(mrl);
        Self {
            access: String::new(),
            demux: String::new(),
            path: raw.to_string(),
            section,
            raw: raw.to_string(),
        }
    }

    /// 路径做百分号解码后的版本；解码结果与原路径相同时返回 None
    pub fn percent_decoded(&self) -> Option<Self> {
        let decoded = percent_decode(&self.path)?;
        if decoded == self.path {
            return None;
        }
        Some(Self {
            path: decoded,
            ..self.clone()
        })
    }
}

/// 按最后一个 '@' 拆出区段，仅当后缀只含 `[0-9:-]` 时才算区段
fn split_section(mrl: &str) -> (&str, SectionRange) {
    if let Some(at) = mrl.rfind('@') {
        let suffix = &mrl[at + 1..];
        if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit() || c == ':' || c == '-') {
            return (&mrl[..at], SectionRange::parse(suffix));
        }
    }
    (mrl, SectionRange::default())
}

fn split_access(mrl: &str) -> (String, String, String) {
    if let Some(colon) = mrl.find(':') {
        let token = &mrl[..colon];
        // 单个字母视为盘符（C:\...）
        let is_access = token.len() > 1
            && !token.starts_with('/')
            && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '/');
        if is_access {
            let rest = &mrl[colon + 1..];
            let path = rest.strip_prefix("//").unwrap_or(rest);
            let (access, demux) = match token.split_once('/') {
                Some((a, d)) => (a, d),
                None => (token, ""),
            };
            return (access.to_string(), demux.to_string(), path.to_string());
        }
    }
    (String::new(), String::new(), mrl.to_string())
}

/// `%XX` 解码；非法序列或解码后不是 UTF-8 时返回 None
fn percent_decode(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = s.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_access_demux_path() {
        let loc = Locator::parse("file/subtitle:///tmp/movie.srt");
        assert_eq!(loc.access, "file");
        assert_eq!(loc.demux, "subtitle");
        assert_eq!(loc.path, "/tmp/movie.srt");
    }

    #[test]
    fn test_drive_letter_is_not_access() {
        let loc = Locator::parse("C:\\Videos\\a.mkv");
        assert_eq!(loc.access, "");
        assert_eq!(loc.path, "C:\\Videos\\a.mkv");
    }

    #[test]
    fn test_token_with_invalid_chars_is_path() {
        let loc = Locator::parse("my movie:part1.mkv");
        assert_eq!(loc.access, "");
        assert_eq!(loc.path, "my movie:part1.mkv");

        let loc = Locator::parse("/tmp/a:b.mkv");
        assert_eq!(loc.access, "");
    }

    #[test]
    fn test_section_suffix() {
        let loc = Locator::parse("dvd:///dev/sr0@2:3-4:5");
        assert_eq!(loc.path, "/dev/sr0");
        assert_eq!(loc.section.start_title, Some(2));
        assert_eq!(loc.section.start_seekpoint, Some(3));
        assert_eq!(loc.section.end_title, Some(4));
        assert_eq!(loc.section.end_seekpoint, Some(5));

        let loc = Locator::parse("file:///a.mkv@:2");
        assert_eq!(loc.section.start_title, None);
        assert_eq!(loc.section.start_seekpoint, Some(2));
        assert_eq!(loc.section.end_title, None);
    }

    #[test]
    fn test_at_sign_in_path_is_not_section() {
        let loc = Locator::parse("http://user@host/a.mp4");
        assert!(loc.section.is_empty());
        assert_eq!(loc.path, "user@host/a.mp4");
    }

    #[test]
    fn test_percent_decoded() {
        let loc = Locator::parse("file:///tmp/my%20movie.mkv");
        let decoded = loc.percent_decoded().expect("应当解码");
        assert_eq!(decoded.path, "/tmp/my movie.mkv");
        assert!(Locator::parse("file:///tmp/a.mkv").percent_decoded().is_none());
        assert!(Locator::parse("file:///tmp/a%zz").percent_decoded().is_none());
    }

    #[test]
    fn test_opaque_keeps_whole_string() {
        let loc = Locator::opaque("weird:thing@1");
        assert_eq!(loc.access, "");
        assert_eq!(loc.path, "weird:thing");
        assert_eq!(loc.section.start_title, Some(1));
    }
}
