use crate::core::{Micros, PlayerError, Result, SECOND};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 章节（title 内可按时间寻址的子段）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Seekpoint {
    pub name: Option<String>,
    pub time_offset: Micros,
    pub byte_offset: Option<u64>,
}

impl Seekpoint {
    pub fn at(time_offset: Micros) -> Self {
        Self {
            name: None,
            time_offset,
            byte_offset: None,
        }
    }

    pub fn named(name: impl Into<String>, time_offset: Micros) -> Self {
        Self {
            name: Some(name.into()),
            time_offset,
            byte_offset: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Title {
    pub name: Option<String>,
    pub length: Micros,
    pub seekpoints: Vec<Seekpoint>,
}

/// 每个源的 title/seekpoint 导航表，打开时取一次，之后只读
///
/// `title_offset` / `seekpoint_offset` 用于内部下标与外部显示编号之间的换算。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TitleTable {
    pub titles: Vec<Title>,
    pub title_offset: usize,
    pub seekpoint_offset: usize,
}

impl TitleTable {
    pub fn new(titles: Vec<Title>) -> Self {
        Self {
            titles,
            title_offset: 0,
            seekpoint_offset: 0,
        }
    }

    pub fn with_offsets(mut self, title_offset: usize, seekpoint_offset: usize) -> Self {
        self.title_offset = title_offset;
        self.seekpoint_offset = seekpoint_offset;
        self
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }

    pub fn title(&self, index: usize) -> Option<&Title> {
        self.titles.get(index)
    }

    pub fn seekpoint_count(&self, title: usize) -> usize {
        self.title(title).map_or(0, |t| t.seekpoints.len())
    }

    pub fn seekpoint(&self, title: usize, index: usize) -> Option<&Seekpoint> {
        self.title(title).and_then(|t| t.seekpoints.get(index))
    }

    pub fn check_title(&self, index: usize) -> Result<()> {
        if index < self.titles.len() {
            Ok(())
        } else {
            Err(PlayerError::InvalidIndex {
                what: "title",
                index,
                count: self.titles.len(),
            })
        }
    }

    pub fn check_seekpoint(&self, title: usize, index: usize) -> Result<()> {
        self.check_title(title)?;
        let count = self.seekpoint_count(title);
        if index < count {
            Ok(())
        } else {
            Err(PlayerError::InvalidIndex {
                what: "seekpoint",
                index,
                count,
            })
        }
    }

    /// 外部显示编号转内部下标
    pub fn title_index(&self, display: usize) -> Option<usize> {
        display.checked_sub(self.title_offset)
    }

    pub fn seekpoint_index(&self, display: usize) -> Option<usize> {
        display.checked_sub(self.seekpoint_offset)
    }

    /// 显示名：没有名字时用 "Title N"
    pub fn title_label(&self, index: usize) -> String {
        match self.title(index).and_then(|t| t.name.as_deref()) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("Title {}", index + self.title_offset),
        }
    }

    /// 显示名：没有名字时用 "Chapter N"
    pub fn seekpoint_label(&self, title: usize, index: usize) -> String {
        match self.seekpoint(title, index).and_then(|s| s.name.as_deref()) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("Chapter {}", index + self.seekpoint_offset),
        }
    }
}

/// 书签
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub name: String,
    pub byte_offset: Option<u64>,
    pub time_offset: Option<Micros>,
}

/// 书签列表，字符串形式为 `{name=…,bytes=…,time=…}{…}`，time 单位为秒
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookmarkList {
    pub items: Vec<Bookmark>,
}

impl BookmarkList {
    pub fn parse(s: &str) -> Result<Self> {
        let mut items = Vec::new();
        let mut rest = s;
        while let Some(open) = rest.find('{') {
            let body_start = open + 1;
            let close = rest[body_start..]
                .find('}')
                .ok_or_else(|| PlayerError::BookmarkError(format!("缺少 '}}': {}", &rest[open..])))?;
            let body = &rest[body_start..body_start + close];
            items.push(parse_bookmark(body)?);
            rest = &rest[body_start + close + 1..];
        }
        Ok(Self { items })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn parse_bookmark(body: &str) -> Result<Bookmark> {
    let mut bookmark = Bookmark::default();
    for field in body.split(',') {
        let field = field.trim();
        if field.is_empty() {
            continue;
        }
        let (key, value) = field
            .split_once('=')
            .ok_or_else(|| PlayerError::BookmarkError(format!("字段缺少 '=': {}", field)))?;
        match key.trim() {
            "name" => bookmark.name = value.to_string(),
            "bytes" => {
                let bytes = value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| PlayerError::BookmarkError(format!("bytes 不是整数: {}", value)))?;
                bookmark.byte_offset = Some(bytes);
            }
            "time" => {
                let secs = value
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| PlayerError::BookmarkError(format!("time 不是整数: {}", value)))?;
                bookmark.time_offset = Some(secs * SECOND);
            }
            _ => {}
        }
    }
    Ok(bookmark)
}

impl fmt::Display for BookmarkList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.items {
            write!(f, "{{name={}", b.name)?;
            if let Some(bytes) = b.byte_offset {
                write!(f, ",bytes={}", bytes)?;
            }
            if let Some(time) = b.time_offset {
                write!(f, ",time={}", time / SECOND)?;
            }
            write!(f, "}}")?;
        }
        Ok(())
    }
}
