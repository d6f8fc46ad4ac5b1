use crate::core::{log_ctx, CancelToken, Micros, PlayerError, Result, MILLISECOND};
use crate::source::module::{Access, Demux, ModuleRegistry, OpenContext};
use crate::source::stream::BufferedStream;
use crate::source::subtitle::SubtitleDemux;
use log::{debug, info};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

/// 本地文件默认缓冲延迟
const FILE_CACHING: Micros = 300 * MILLISECOND;

/// 字幕解复用器接受的名字
const SUBTITLE_DEMUX_NAMES: [&str; 8] = ["subtitle", "subrip", "srt", "ass", "ssa", "vtt", "webvtt", "any"];

/// 本地文件访问
pub struct FileAccess {
    file: File,
    cancel: CancelToken,
}

impl FileAccess {
    pub fn open(path: &str, ctx: &OpenContext) -> Result<Self> {
        let file = File::open(path)?;
        if file.metadata()?.is_dir() {
            return Err(PlayerError::OpenError(format!("是目录而不是文件: {}", path)));
        }
        info!("{} 📁 打开本地文件: {}", log_ctx(&ctx.label), path);
        Ok(Self {
            file,
            cancel: ctx.cancel.clone(),
        })
    }
}

impl Access for FileAccess {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(PlayerError::Cancelled);
        }
        Ok(self.file.read(buf)?)
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn size(&self) -> Option<u64> {
        self.file.metadata().ok().map(|m| m.len())
    }

    fn can_seek(&self) -> bool {
        true
    }

    fn pts_delay(&self) -> Micros {
        FILE_CACHING
    }
}

/// 内置模块：本地文件访问、文本字幕解复用，以及（ffmpeg 特性下的）FFmpeg 自解复用访问
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinRegistry;

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self
    }
}

impl ModuleRegistry for BuiltinRegistry {
    fn open_access_demux(&self, access: &str, demux: &str, path: &str, ctx: &OpenContext) -> Result<Box<dyn Demux>> {
        #[cfg(feature = "ffmpeg")]
        {
            use crate::source::ffmpeg::FfmpegDemux;
            use crate::source::subtitle::is_subtitle_path;

            let wants_ffmpeg = matches!(access, "ffmpeg" | "avformat") || matches!(demux, "ffmpeg" | "avformat");
            let generic = !SUBTITLE_DEMUX_NAMES.contains(&demux) && !is_subtitle_path(std::path::Path::new(path));
            if wants_ffmpeg || generic {
                let url = match access {
                    "" | "file" | "ffmpeg" | "avformat" => path.to_string(),
                    scheme => format!("{}://{}", scheme, path),
                };
                return Ok(Box::new(FfmpegDemux::open(&url, ctx)?));
            }
        }
        debug!(
            "{} 内置模块没有自解复用访问: access='{}' demux='{}' path='{}'",
            log_ctx(&ctx.label),
            access,
            demux,
            path
        );
        Err(PlayerError::Unsupported("access_demux"))
    }

    fn open_access(&self, access: &str, path: &str, ctx: &OpenContext) -> Result<Box<dyn Access>> {
        match access {
            "" | "file" => Ok(Box::new(FileAccess::open(path, ctx)?)),
            other => Err(PlayerError::OpenError(format!("未知访问模块: {}", other))),
        }
    }

    fn open_demux(&self, demux: &str, path: &str, stream: BufferedStream, ctx: &OpenContext) -> Result<Box<dyn Demux>> {
        if demux.is_empty() || SUBTITLE_DEMUX_NAMES.contains(&demux) {
            return Ok(Box::new(SubtitleDemux::open(path, stream, ctx)?));
        }
        Err(PlayerError::OpenError(format!("未知解复用模块: {}", demux)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::output::NullSink;
    use crate::source::module::DemuxStatus;
    use std::sync::Arc;

    fn ctx() -> OpenContext {
        OpenContext {
            cancel: CancelToken::new(),
            out: Arc::new(NullSink),
            label: "builtin".into(),
        }
    }

    #[test]
    fn test_file_access_reads_and_seeks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"0123456789").unwrap();

        let ctx = ctx();
        let mut access = FileAccess::open(path.to_str().unwrap(), &ctx).unwrap();
        assert_eq!(access.size(), Some(10));
        access.seek(4).unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(access.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"456");

        ctx.cancel.cancel();
        assert!(matches!(access.read(&mut buf), Err(PlayerError::Cancelled)));
    }

    #[test]
    fn test_unknown_modules_are_rejected() {
        let registry = BuiltinRegistry::new();
        assert!(registry.open_access("gopher", "x", &ctx()).is_err());
        assert!(registry.open_access("file", "/definitely/not/here.srt", &ctx()).is_err());
    }

    #[test]
    fn test_subtitle_file_through_registry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.srt");
        std::fs::write(&path, "1\n00:00:01,000 --> 00:00:02,000\nHi\n").unwrap();
        let path = path.to_str().unwrap();

        let registry = BuiltinRegistry::new();
        let ctx = ctx();
        let access = registry.open_access("file", path, &ctx).unwrap();
        let stream = BufferedStream::new(Arc::new(parking_lot::Mutex::new(access)));
        let mut demux = registry.open_demux("", path, stream, &ctx).unwrap();
        assert_eq!(demux.demux().unwrap(), DemuxStatus::Eof);
        assert_eq!(demux.length(), Some(2_000_000));
    }
}
