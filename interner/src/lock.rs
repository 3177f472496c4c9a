//  A busy-waiting lock, for short critical sections.

use std::{
    cell::UnsafeCell,
    fmt, hint,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, Ordering},
};

/// A spin lock.
///
/// Not reentrant: locking twice from the same thread dead-locks.
pub(crate) struct SpinLock<T> {
    locked: AtomicBool,
    value: UnsafeCell<T>,
}

impl<T> SpinLock<T> {
    /// Creates a new, unlocked, instance.
    pub(crate) const fn new(value: T) -> Self {
        let locked = AtomicBool::new(false);
        let value = UnsafeCell::new(value);

        Self { locked, value }
    }

    /// Locks, spinning until the lock is acquired.
    #[inline]
    pub(crate) fn lock(&self) -> SpinLockGuard<'_, T> {
        loop {
            if let Some(guard) = self.try_lock() {
                return guard;
            }

            //  Wait for the lock to look free before attempting to write to it again.
            while self.locked.load(Ordering::Relaxed) {
                hint::spin_loop();
            }
        }
    }

    /// Attempts to lock, without spinning.
    #[inline]
    pub(crate) fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        self.locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| SpinLockGuard { lock: self })
    }
}

impl<T> fmt::Debug for SpinLock<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self.try_lock() {
            Some(guard) => f.debug_tuple("SpinLock").field(&*guard).finish(),
            None => write!(f, "SpinLock(<locked>)"),
        }
    }
}

//  Safety:
//  -   The lock only hands out access to `T` to one thread at a time, hence `T: Send` is sufficient.
unsafe impl<T> Send for SpinLock<T> where T: Send {}
unsafe impl<T> Sync for SpinLock<T> where T: Send {}

/// Exclusive access to the value of a `SpinLock`, released on drop.
pub(crate) struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        //  Safety:
        //  -   The guard exists, hence the lock is held, hence no other reference to the value exists.
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        //  Safety:
        //  -   The guard exists, hence the lock is held, hence no other reference to the value exists.
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    fn ensure_send<T: Send>() {}
    fn ensure_sync<T: Sync>() {}

    #[test]
    fn spin_lock_send_sync() {
        ensure_send::<SpinLock<Vec<u8>>>();
        ensure_sync::<SpinLock<Vec<u8>>>();
    }

    #[test]
    fn try_lock_while_locked() {
        let lock = SpinLock::new(3);

        let guard = lock.lock();

        assert!(lock.try_lock().is_none());
        assert_eq!("SpinLock(<locked>)", format!("{lock:?}"));

        drop(guard);

        assert_eq!(Some(3), lock.try_lock().map(|g| *g));
        assert_eq!("SpinLock(3)", format!("{lock:?}"));
    }

    #[test]
    fn mutual_exclusion() {
        const THREADS: usize = 8;
        const INCREMENTS: usize = 10_000;

        let lock = Arc::new(SpinLock::new(0usize));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let lock = lock.clone();

                thread::spawn(move || {
                    for _ in 0..INCREMENTS {
                        *lock.lock() += 1;
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(THREADS * INCREMENTS, *lock.lock());
    }
} // mod tests
