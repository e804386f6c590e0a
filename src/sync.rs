// Proxy Control - Lock Helpers
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Lock helpers that recover from poisoning.
//!
//! Poison indicates a panic in another thread while the lock was held, but
//! the data itself is still usable here: every guarded value is replaced
//! wholesale or mutated in a single step.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

/// Lock a mutex, recovering from poison if needed.
pub fn lock<'a, T>(mutex: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("Mutex poisoned locking {}, recovering", context);
            poisoned.into_inner()
        }
    }
}

/// Read from an RwLock, recovering from poison if needed.
pub fn read<'a, T>(lock: &'a RwLock<T>, context: &str) -> RwLockReadGuard<'a, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("RwLock poisoned reading {}, recovering", context);
            poisoned.into_inner()
        }
    }
}

/// Write to an RwLock, recovering from poison if needed.
pub fn write<'a, T>(lock: &'a RwLock<T>, context: &str) -> RwLockWriteGuard<'a, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("RwLock poisoned writing {}, recovering", context);
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_recovers_poisoned_mutex() {
        let mutex = Arc::new(Mutex::new(1));
        let poisoner = Arc::clone(&mutex);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison");
        })
        .join();

        assert!(mutex.is_poisoned());
        *lock(&mutex, "test") += 1;
        assert_eq!(*lock(&mutex, "test"), 2);
    }
}
