//! Registry of published frames.
//!
//! Derived tables (statistics, predicates, working copies) are published under
//! an opaque [`FrameKey`] and stay alive until their owner disposes of them,
//! either explicitly or by dropping a [`Scoped`] guard. Structural mutation of
//! a published frame goes through [`FrameStore::write`], which holds the
//! frame's write lock for the whole change so readers never observe a half
//! updated column set.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fnv::FnvHashMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Result, TargetEncodingError};
use crate::frame::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameKey(u64);

impl fmt::Display for FrameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame#{}", self.0)
    }
}

pub type SharedFrame = Arc<RwLock<Frame>>;

#[derive(Debug, Default)]
pub struct FrameStore {
    next_key: AtomicU64,
    frames: RwLock<FnvHashMap<FrameKey, SharedFrame>>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, frame: Frame) -> FrameKey {
        let key = FrameKey(self.next_key.fetch_add(1, Ordering::Relaxed));
        debug!(%key, rows = frame.nrows(), cols = frame.ncols(), "publishing frame");
        self.frames.write().insert(key, Arc::new(RwLock::new(frame)));
        key
    }

    /// Publishes `frame` and returns a guard that disposes of it on drop.
    pub fn scoped(&self, frame: Frame) -> Scoped<'_> {
        Scoped {
            store: self,
            key: self.publish(frame),
        }
    }

    pub fn get(&self, key: FrameKey) -> Result<SharedFrame> {
        self.frames
            .read()
            .get(&key)
            .cloned()
            .ok_or(TargetEncodingError::UnknownFrame(key))
    }

    pub fn read<R>(&self, key: FrameKey, f: impl FnOnce(&Frame) -> R) -> Result<R> {
        let frame = self.get(key)?;
        let guard = frame.read();
        Ok(f(&*guard))
    }

    /// Runs a structural mutation under the frame's exclusive lock. Readers
    /// block until `f` returns.
    pub fn write<R>(&self, key: FrameKey, f: impl FnOnce(&mut Frame) -> Result<R>) -> Result<R> {
        let frame = self.get(key)?;
        let mut guard = frame.write();
        f(&mut *guard)
    }

    /// Removes the frame from the store. Returns it if no other handle still
    /// shares it.
    pub fn dispose(&self, key: FrameKey) -> Option<Frame> {
        let removed = self.frames.write().remove(&key)?;
        debug!(%key, "disposed frame");
        Arc::try_unwrap(removed).ok().map(RwLock::into_inner)
    }

    pub fn contains(&self, key: FrameKey) -> bool {
        self.frames.read().contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.frames.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A published frame owned by the current scope.
pub struct Scoped<'a> {
    store: &'a FrameStore,
    key: FrameKey,
}

impl<'a> Scoped<'a> {
    pub fn key(&self) -> FrameKey {
        self.key
    }

    pub fn read<R>(&self, f: impl FnOnce(&Frame) -> R) -> Result<R> {
        self.store.read(self.key, f)
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut Frame) -> Result<R>) -> Result<R> {
        self.store.write(self.key, f)
    }
}

impl<'a> Drop for Scoped<'a> {
    fn drop(&mut self) {
        self.store.dispose(self.key);
    }
}
