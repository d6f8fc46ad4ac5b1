use anyhow::Result;
use log::info;
use myy_input::input::StatusEvent;
use myy_input::{BuiltinRegistry, MediaItem, QueueSink, Session, SessionOptions};
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<()> {
    // 初始化日志
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let mut args = std::env::args().skip(1);
    let Some(locator) = args.next() else {
        eprintln!("用法: myy-input <定位符> [选项...]");
        eprintln!("例如: myy-input /videos/movie.mkv :start-time=10 repeat=1");
        std::process::exit(2);
    };

    #[cfg(feature = "ffmpeg")]
    {
        ffmpeg_next::init().map_err(|e| anyhow::anyhow!("FFmpeg 初始化失败: {}", e))?;
        info!("✅ FFmpeg 初始化成功");
    }

    let mut item = MediaItem::new(locator);
    for option in args {
        item = item.with_option(option);
    }

    info!("🎬 MYY Input 启动: {}", item.uri);
    let sink = Arc::new(QueueSink::new().with_sample_rate(48_000));
    let mut session = Session::create(item, SessionOptions::default(), Arc::new(BuiltinRegistry::new()), sink.clone())?;
    let events = session.subscribe();

    loop {
        // 充当下游消费者，否则会话结束时会一直等输出端清空
        while let Some(packet) = sink.pop() {
            if packet.packet_type == myy_input::core::PacketType::Subtitle {
                info!("💬 [{}µs] {}", packet.pts, String::from_utf8_lossy(&packet.data));
            }
        }

        match events.recv_timeout(Duration::from_millis(50)) {
            Ok(StatusEvent::Changed(snapshot)) => {
                println!("{}", serde_json::to_string(&snapshot)?);
                if snapshot.state.is_terminal() {
                    break;
                }
            }
            Ok(StatusEvent::State(state)) => info!("🔄 状态: {:?}", state),
            Err(_) if session.is_finished() => break,
            Err(_) => {}
        }
    }

    while sink.pop().is_some() {}
    session.join()?;
    info!("👋 退出");
    Ok(())
}
