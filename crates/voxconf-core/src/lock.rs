//! Process-wide lock serializing layer file I/O.
//!
//! Every `load`, `reload` and `store` body runs under this one lock, so a
//! file is never read while another layer in the same process is writing.
//! The lock is reentrant: `reload` calls `load` while already holding it.

use std::sync::LazyLock;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

static FILE_LOCK: LazyLock<ReentrantMutex<()>> = LazyLock::new(|| ReentrantMutex::new(()));

/// Acquires the shared file lock for the current thread.
pub(crate) fn file_lock() -> ReentrantMutexGuard<'static, ()> {
    FILE_LOCK.lock()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_is_reentrant() {
        let _outer = file_lock();
        let _inner = file_lock();
    }
}
