use crate::core::{PlayerError, Result};
use crate::source::module::Access;
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 源句柄与缓冲流共享的访问层
pub type SharedAccess = Arc<Mutex<Box<dyn Access>>>;

const CHUNK_SIZE: usize = 64 * 1024;

/// 访问层之上可定位的缓冲字节流
///
/// 不可定位的访问层上，向前定位通过读取丢弃实现。
pub struct BufferedStream {
    access: SharedAccess,
    buffer: Vec<u8>,
    /// buffer 中下一个要读的字节
    cursor: usize,
    /// buffer[0] 对应的绝对偏移
    base: u64,
    bytes_read: Arc<AtomicU64>,
    eof: bool,
}

impl BufferedStream {
    pub fn new(access: SharedAccess) -> Self {
        Self {
            access,
            buffer: Vec::new(),
            cursor: 0,
            base: 0,
            bytes_read: Arc::new(AtomicU64::new(0)),
            eof: false,
        }
    }

    /// 当前绝对偏移
    pub fn tell(&self) -> u64 {
        self.base + self.cursor as u64
    }

    pub fn size(&self) -> Option<u64> {
        self.access.lock().size()
    }

    pub fn can_seek(&self) -> bool {
        self.access.lock().can_seek()
    }

    /// 从访问层读到的总字节数（统计用，可跨线程读取）
    pub fn bytes_counter(&self) -> Arc<AtomicU64> {
        self.bytes_read.clone()
    }

    /// 预览接下来最多 `len` 个字节，不移动读位置
    pub fn peek(&mut self, len: usize) -> Result<&[u8]> {
        while self.buffer.len() - self.cursor < len && !self.eof {
            if self.fill()? == 0 {
                break;
            }
        }
        let end = (self.cursor + len).min(self.buffer.len());
        Ok(&self.buffer[self.cursor..end])
    }

    /// 读取剩余全部内容
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        io::Read::read_to_end(self, &mut data)?;
        Ok(data)
    }

    fn fill(&mut self) -> Result<usize> {
        // 已读部分过多时丢弃，避免缓冲无限增长
        if self.cursor >= CHUNK_SIZE * 4 {
            self.buffer.drain(..self.cursor);
            self.base += self.cursor as u64;
            self.cursor = 0;
        }
        let start = self.buffer.len();
        self.buffer.resize(start + CHUNK_SIZE, 0);
        let n = {
            let mut access = self.access.lock();
            access.read(&mut self.buffer[start..])
        };
        let n = match n {
            Ok(n) => n,
            Err(e) => {
                self.buffer.truncate(start);
                return Err(e);
            }
        };
        self.buffer.truncate(start + n);
        if n == 0 {
            self.eof = true;
        }
        self.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }

    fn seek_to(&mut self, target: u64) -> Result<u64> {
        let end = self.base + self.buffer.len() as u64;
        if target >= self.base && target <= end {
            self.cursor = (target - self.base) as usize;
            return Ok(target);
        }

        let can_seek = self.access.lock().can_seek();
        if can_seek {
            self.access.lock().seek(target)?;
            self.buffer.clear();
            self.cursor = 0;
            self.base = target;
            self.eof = false;
            return Ok(target);
        }

        if target < self.base {
            return Err(PlayerError::SeekUnsupported);
        }
        // 不可定位：向前读取直到目标位置
        self.cursor = self.buffer.len();
        while self.base + (self.buffer.len() as u64) < target {
            if self.fill()? == 0 {
                return Err(PlayerError::ReadError(format!("定位越过流末尾: {}", target)));
            }
        }
        self.cursor = (target - self.base) as usize;
        Ok(target)
    }
}

impl io::Read for BufferedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.cursor >= self.buffer.len() && !self.eof {
            self.fill().map_err(to_io)?;
        }
        let available = &self.buffer[self.cursor..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.cursor += n;
        Ok(n)
    }
}

impl io::Seek for BufferedStream {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let target = match pos {
            io::SeekFrom::Start(offset) => offset as i128,
            io::SeekFrom::Current(delta) => self.tell() as i128 + delta as i128,
            io::SeekFrom::End(delta) => {
                let size = self
                    .size()
                    .ok_or_else(|| io::Error::new(io::ErrorKind::Unsupported, "流大小未知"))?;
                size as i128 + delta as i128
            }
        };
        if target < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "定位到负偏移"));
        }
        self.seek_to(target as u64).map_err(to_io)
    }
}

fn to_io(e: PlayerError) -> io::Error {
    match e {
        PlayerError::IoError(e) => e,
        other => io::Error::new(io::ErrorKind::Other, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek, SeekFrom};

    /// 内存访问层，`seekable` 控制是否支持定位
    struct MemoryAccess {
        data: Vec<u8>,
        pos: usize,
        seekable: bool,
    }

    impl Access for MemoryAccess {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            // 每次最多给 7 字节，模拟短读
            let n = buf.len().min(7).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }

        fn seek(&mut self, offset: u64) -> Result<()> {
            if !self.seekable {
                return Err(PlayerError::SeekUnsupported);
            }
            self.pos = offset as usize;
            Ok(())
        }

        fn size(&self) -> Option<u64> {
            Some(self.data.len() as u64)
        }

        fn can_seek(&self) -> bool {
            self.seekable
        }
    }

    fn stream(seekable: bool) -> BufferedStream {
        let data: Vec<u8> = (0..100u8).collect();
        let access: Box<dyn Access> = Box::new(MemoryAccess { data, pos: 0, seekable });
        BufferedStream::new(Arc::new(Mutex::new(access)))
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut s = stream(true);
        assert_eq!(s.peek(10).unwrap(), &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        let mut buf = [0u8; 3];
        s.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0, 1, 2]);
        assert_eq!(s.tell(), 3);
    }

    #[test]
    fn test_read_all_and_counter() {
        let mut s = stream(true);
        let counter = s.bytes_counter();
        let data = s.read_all().unwrap();
        assert_eq!(data.len(), 100);
        assert_eq!(counter.load(Ordering::Relaxed), 100);
    }

    #[test]
    fn test_seek_seekable_access() {
        let mut s = stream(true);
        s.seek(SeekFrom::Start(90)).unwrap();
        let mut buf = [0u8; 2];
        s.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [90, 91]);
        s.seek(SeekFrom::End(-1)).unwrap();
        s.read_exact(&mut buf[..1]).unwrap();
        assert_eq!(buf[0], 99);
    }

    #[test]
    fn test_forward_seek_on_unseekable_access() {
        let mut s = stream(false);
        s.seek(SeekFrom::Start(50)).unwrap();
        let mut buf = [0u8; 1];
        s.read_exact(&mut buf).unwrap();
        assert_eq!(buf[0], 50);
        // 缓冲内回退仍可用
        s.seek(SeekFrom::Start(10)).unwrap();
        s.read_exact(&mut buf).unwrap();
        assert_eq!(buf[0], 10);
    }
}
