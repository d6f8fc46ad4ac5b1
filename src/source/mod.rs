// 输入源：定位符解析、模块接口、缓冲流、源句柄和内置模块

pub mod builtin;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod handle;
pub mod locator;
pub mod module;
pub mod stream;
pub mod subtitle;
pub mod title;

pub use builtin::{BuiltinRegistry, FileAccess};
pub use handle::{SourceCaps, SourceHandle};
pub use locator::{Locator, SectionRange};
pub use module::{Access, Demux, DemuxStatus, ModuleRegistry, OpenContext, Updates};
pub use stream::{BufferedStream, SharedAccess};
pub use subtitle::{find_subtitle_files, SubtitleDemux};
pub use title::{Bookmark, BookmarkList, Seekpoint, Title, TitleTable};
