use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out strictly increasing version numbers for local state changes.
///
/// Versions are only comparable within one generation of a node; a restart
/// starts over from zero and relies on the generation bump.
#[derive(Debug, Default)]
pub struct VersionGenerator {
    current: AtomicU64,
}

impl VersionGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next version. The first call returns 1.
    pub fn increment_and_get(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Last version handed out, 0 if none yet.
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}
