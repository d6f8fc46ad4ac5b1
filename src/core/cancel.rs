use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 分层的协作式取消标记
///
/// 会话持有根标记，每个源句柄持有其子标记，access/demux 再拿到源句柄的子标记。
/// 取消父标记后所有子标记都视为已取消；取消子标记不影响父标记。
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Box<CancelToken>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// 派生子标记
    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Box::new(self.clone())),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::SeqCst) {
            return true;
        }
        self.parent.as_ref().map_or(false, |p| p.is_cancelled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_cancel_reaches_children() {
        let root = CancelToken::new();
        let source = root.child();
        let demux = source.child();
        assert!(!demux.is_cancelled());

        root.cancel();
        assert!(source.is_cancelled());
        assert!(demux.is_cancelled());
    }

    #[test]
    fn test_child_cancel_is_local() {
        let root = CancelToken::new();
        let a = root.child();
        let b = root.child();
        a.cancel();
        assert!(a.is_cancelled());
        assert!(!b.is_cancelled());
        assert!(!root.is_cancelled());
    }
}
