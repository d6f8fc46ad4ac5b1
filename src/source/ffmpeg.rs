use crate::core::{log_ctx, MediaPacket, Micros, PacketType, PlayerError, Result, MILLISECOND};
use crate::input::output::OutputSink;
use crate::source::module::{Demux, DemuxStatus, OpenContext, Updates};
use crate::source::title::{Seekpoint, Title, TitleTable};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{format, media, Rational};
use log::{debug, info, warn};
use std::sync::Arc;

/// 网络流默认缓冲延迟
const NETWORK_CACHING: Micros = 1000 * MILLISECOND;

fn is_network(url: &str) -> bool {
    url.starts_with("http://")
        || url.starts_with("https://")
        || url.starts_with("rtsp://")
        || url.starts_with("rtmp://")
        || url.contains(".m3u8")
}

fn to_micros(ts: i64, time_base: Rational) -> Micros {
    if time_base.denominator() == 0 {
        return 0;
    }
    (ts as i128 * time_base.numerator() as i128 * 1_000_000 / time_base.denominator() as i128) as Micros
}

/// FFmpeg 自解复用访问：打开 URL/文件，章节作为 seekpoint
pub struct FfmpegDemux {
    label: String,
    out: Arc<dyn OutputSink>,
    input: format::context::Input,
    /// 下标 = 流序号
    kinds: Vec<Option<PacketType>>,
    time_bases: Vec<Rational>,
    clock_stream: Option<usize>,
    time: Micros,
    length: Option<Micros>,
    titles: TitleTable,
    seekpoint: usize,
    updates: Updates,
    network: bool,
}

impl FfmpegDemux {
    pub fn open(url: &str, ctx: &OpenContext) -> Result<Self> {
        ffmpeg::init().map_err(|e| PlayerError::OpenError(format!("FFmpeg 初始化失败: {}", e)))?;

        let network = is_network(url);
        let input = if network {
            info!("{} 🌐 检测到网络流，应用网络选项", log_ctx(&ctx.label));
            let mut options = ffmpeg::Dictionary::new();
            options.set("fflags", "+discardcorrupt+genpts");
            options.set("timeout", "15000000");
            options.set("rw_timeout", "8000000");
            options.set("reconnect", "1");
            options.set("reconnect_streamed", "1");
            format::input_with_dictionary(&url, options)
                .map_err(|e| PlayerError::OpenError(format!("无法打开网络流: {}", e)))?
        } else {
            format::input(&url).map_err(|e| PlayerError::OpenError(format!("无法打开文件: {}", e)))?
        };

        let mut kinds = Vec::new();
        let mut time_bases = Vec::new();
        for stream in input.streams() {
            kinds.push(match stream.parameters().medium() {
                media::Type::Video => Some(PacketType::Video),
                media::Type::Audio => Some(PacketType::Audio),
                media::Type::Subtitle => Some(PacketType::Subtitle),
                _ => None,
            });
            time_bases.push(stream.time_base());
        }
        let clock_stream = input
            .streams()
            .best(media::Type::Video)
            .or_else(|| input.streams().best(media::Type::Audio))
            .map(|s| s.index());

        let length = Some(input.duration()).filter(|d| *d > 0);
        let titles = Self::chapter_titles(&input, length.unwrap_or(0));
        info!(
            "{} 🎬 FFmpeg 已打开: {}（{} 路流，{} 个章节）",
            log_ctx(&ctx.label),
            url,
            kinds.len(),
            titles.seekpoint_count(0)
        );

        Ok(Self {
            label: ctx.label.clone(),
            out: ctx.out.clone(),
            input,
            kinds,
            time_bases,
            clock_stream,
            time: 0,
            length,
            titles,
            seekpoint: 0,
            updates: Updates::default(),
            network,
        })
    }

    fn chapter_titles(input: &format::context::Input, length: Micros) -> TitleTable {
        let seekpoints: Vec<Seekpoint> = input
            .chapters()
            .map(|chapter| Seekpoint {
                name: chapter.metadata().get("title").map(str::to_string),
                time_offset: to_micros(chapter.start(), chapter.time_base()),
                byte_offset: None,
            })
            .collect();
        if seekpoints.is_empty() {
            return TitleTable::default();
        }
        TitleTable::new(vec![Title {
            name: None,
            length,
            seekpoints,
        }])
    }

    /// 当前时间落在哪个章节
    fn seekpoint_at(&self, time: Micros) -> usize {
        self.titles
            .title(0)
            .map(|t| t.seekpoints.iter().rposition(|s| s.time_offset <= time).unwrap_or(0))
            .unwrap_or(0)
    }
}

impl Demux for FfmpegDemux {
    fn demux(&mut self) -> Result<DemuxStatus> {
        let next = self.input.packets().next().map(|(stream, packet)| (stream.index(), packet));
        let Some((index, packet)) = next else {
            return Ok(DemuxStatus::Eof);
        };
        let Some(kind) = self.kinds.get(index).copied().flatten() else {
            return Ok(DemuxStatus::Continue);
        };
        let time_base = self.time_bases[index];
        let pts = packet.pts().or(packet.dts()).map(|ts| to_micros(ts, time_base)).unwrap_or(self.time);
        let duration = to_micros(packet.duration(), time_base);

        if Some(index) == self.clock_stream {
            self.time = pts;
            let seekpoint = self.seekpoint_at(pts);
            if seekpoint != self.seekpoint {
                self.seekpoint = seekpoint;
                self.updates.seekpoint = Some(seekpoint);
            }
        }

        self.out.send(MediaPacket {
            es_id: index as i32,
            packet_type: kind,
            pts,
            duration,
            data: packet.data().map(<[u8]>::to_vec).unwrap_or_default(),
        })?;
        Ok(DemuxStatus::Continue)
    }

    fn time(&self) -> Option<Micros> {
        Some(self.time)
    }

    fn length(&self) -> Option<Micros> {
        self.length
    }

    fn set_time(&mut self, time: Micros) -> Result<()> {
        self.input.seek(time, ..time)?;
        debug!("{} FFmpeg 跳转到 {}us", log_ctx(&self.label), time);
        self.time = time;
        self.seekpoint = self.seekpoint_at(time);
        Ok(())
    }

    fn set_position(&mut self, position: f64) -> Result<()> {
        let length = self.length.ok_or(PlayerError::SeekUnsupported)?;
        self.set_time((length as f64 * position.clamp(0.0, 1.0)) as Micros)
    }

    fn titles(&self) -> Option<TitleTable> {
        (!self.titles.is_empty()).then(|| self.titles.clone())
    }

    fn set_title(&mut self, index: usize) -> Result<()> {
        self.titles.check_title(index)?;
        self.set_seekpoint(0)
    }

    fn set_seekpoint(&mut self, index: usize) -> Result<()> {
        self.titles.check_seekpoint(0, index)?;
        let offset = self.titles.seekpoint(0, index).map_or(0, |s| s.time_offset);
        self.set_time(offset)?;
        self.seekpoint = index;
        Ok(())
    }

    fn take_updates(&mut self) -> Updates {
        std::mem::take(&mut self.updates)
    }

    fn can_seek(&self) -> bool {
        self.length.is_some()
    }

    fn can_pause(&self) -> bool {
        true
    }

    fn set_pause_state(&mut self, paused: bool) -> Result<()> {
        let result = if paused { self.input.pause() } else { self.input.play() };
        if let Err(e) = result {
            // 本地文件不支持 av_read_pause，由读循环停读即可
            if self.network {
                warn!("{} ⚠ 网络流暂停/恢复失败: {}", log_ctx(&self.label), e);
                return Err(e.into());
            }
        }
        Ok(())
    }

    fn pts_delay(&self) -> Micros {
        if self.network {
            NETWORK_CACHING
        } else {
            0
        }
    }

    fn meta(&self) -> Vec<(String, String)> {
        self.input
            .metadata()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}
