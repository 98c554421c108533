//! Grace periods and deferred reclamation
//!
//! Readers enter a read-side critical section with [`GracePeriod::read_lock`]
//! and may use anything they found through an [`RcuCell`] until the guard is
//! dropped. Writers unlink first and then hand the cleanup to
//! [`GracePeriod::call`]; the callback runs only after every reader that
//! could still see the old data has left.
//!
//! Readers are counted per epoch parity. Retiring a batch of callbacks flips
//! the epoch, after which new readers land on the other counter and the batch
//! completes as soon as the retired counter drains. A reader re-checks the
//! epoch after announcing itself, so it can never be counted on a parity
//! that was already retired. The last reader to leave a retired parity runs
//! the batch itself, so reclamation does not wait for the next writer.
//!
//! # Usage
//!
//! ```rust
//! use nos_xdp::rcu::GracePeriod;
//!
//! let gp = GracePeriod::new();
//! {
//!     let _guard = gp.read_lock();
//!     gp.call(Box::new(|| ()));
//!     assert_eq!(gp.pending(), 1); // reader still inside
//! }
//! gp.synchronize();
//! assert_eq!(gp.pending(), 0);
//! ```

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize, Ordering};
use spin::Mutex;

/// Work deferred until the end of a grace period
pub type RcuCallback = Box<dyn FnOnce() + Send>;

/// Callbacks waiting for readers of one epoch parity
struct Batch {
    parity: usize,
    callbacks: Vec<RcuCallback>,
}

#[derive(Default)]
struct Callbacks {
    /// Queued since the last flip
    pending: Vec<RcuCallback>,
    /// Retired by a flip, waiting for its readers
    in_flight: Option<Batch>,
}

/// A grace-period domain.
pub struct GracePeriod {
    epoch: AtomicU64,
    readers: [AtomicUsize; 2],
    /// Parity of the batch in flight plus one, `0` when none
    retiring: AtomicUsize,
    callbacks: Mutex<Callbacks>,
}

impl Default for GracePeriod {
    fn default() -> Self {
        Self::new()
    }
}

impl GracePeriod {
    /// Create an idle domain
    pub fn new() -> Self {
        Self {
            epoch: AtomicU64::new(0),
            readers: [AtomicUsize::new(0), AtomicUsize::new(0)],
            retiring: AtomicUsize::new(0),
            callbacks: Mutex::new(Callbacks::default()),
        }
    }

    /// Enter a read-side critical section.
    ///
    /// Must not sleep or call [`GracePeriod::synchronize`] while the guard
    /// is held.
    #[inline]
    pub fn read_lock(&self) -> RcuReadGuard<'_> {
        loop {
            let epoch = self.epoch.load(Ordering::SeqCst);
            let parity = (epoch & 1) as usize;
            self.readers[parity].fetch_add(1, Ordering::SeqCst);
            if self.epoch.load(Ordering::SeqCst) == epoch {
                return RcuReadGuard {
                    domain: self,
                    parity,
                    _not_send: PhantomData,
                };
            }
            // Raced with a flip; announce again on the new parity.
            self.leave(parity);
        }
    }

    /// Queue `callback` to run once all current readers are gone.
    ///
    /// Nothing runs inline; callbacks are executed by a later
    /// [`GracePeriod::poll`] or [`GracePeriod::synchronize`].
    pub fn call(&self, callback: RcuCallback) {
        self.callbacks.lock().pending.push(callback);
    }

    /// Advance grace periods without blocking.
    ///
    /// Runs every callback whose grace period has elapsed and returns how
    /// many ran. Callbacks run after the internal lock is dropped, so they
    /// may queue more work.
    pub fn poll(&self) -> usize {
        let ready = {
            let mut callbacks = self.callbacks.lock();
            self.advance(&mut callbacks)
        };
        let count = ready.len();
        for callback in ready {
            callback();
        }
        if count > 0 {
            xdp_trace!("rcu: ran {} deferred callbacks", count);
        }
        count
    }

    /// Wait until every queued callback has run.
    ///
    /// Spins; deadlocks if called from inside a read-side critical section.
    pub fn synchronize(&self) {
        loop {
            self.poll();
            if self.is_idle() {
                return;
            }
            core::hint::spin_loop();
        }
    }

    /// Number of callbacks not yet run
    pub fn pending(&self) -> usize {
        let callbacks = self.callbacks.lock();
        callbacks.pending.len()
            + callbacks.in_flight.as_ref().map_or(0, |batch| batch.callbacks.len())
    }

    /// Number of readers currently inside a critical section
    pub fn active_readers(&self) -> usize {
        self.readers[0].load(Ordering::SeqCst) + self.readers[1].load(Ordering::SeqCst)
    }

    /// Drop a reader of `parity`, finishing its batch if it was the last one
    fn leave(&self, parity: usize) {
        let left = self.readers[parity].fetch_sub(1, Ordering::SeqCst) - 1;
        if left == 0 && self.retiring.load(Ordering::SeqCst) == parity + 1 {
            self.poll();
        }
    }

    fn is_idle(&self) -> bool {
        let callbacks = self.callbacks.lock();
        callbacks.pending.is_empty() && callbacks.in_flight.is_none()
    }

    fn advance(&self, callbacks: &mut Callbacks) -> Vec<RcuCallback> {
        let mut ready = Vec::new();
        loop {
            if let Some(batch) = &callbacks.in_flight {
                if self.readers[batch.parity].load(Ordering::SeqCst) != 0 {
                    return ready;
                }
                if let Some(batch) = callbacks.in_flight.take() {
                    ready.extend(batch.callbacks);
                }
                self.retiring.store(0, Ordering::SeqCst);
            }
            if callbacks.pending.is_empty() {
                return ready;
            }
            // Everything pending was unlinked before this flip, so only
            // readers of the outgoing parity can still reference it.
            let retired = self.epoch.fetch_add(1, Ordering::SeqCst);
            let parity = (retired & 1) as usize;
            callbacks.in_flight = Some(Batch {
                parity,
                callbacks: core::mem::take(&mut callbacks.pending),
            });
            self.retiring.store(parity + 1, Ordering::SeqCst);
        }
    }
}

impl Drop for GracePeriod {
    fn drop(&mut self) {
        // Guards borrow the domain, so no reader can be left at this point.
        let callbacks = self.callbacks.get_mut();
        let in_flight = callbacks.in_flight.take().map(|batch| batch.callbacks);
        for callback in in_flight.into_iter().flatten() {
            callback();
        }
        for callback in core::mem::take(&mut callbacks.pending) {
            callback();
        }
    }
}

/// Guard for a read-side critical section
pub struct RcuReadGuard<'a> {
    domain: &'a GracePeriod,
    parity: usize,
    // Leaving the section has to happen on the thread that entered it.
    _not_send: PhantomData<*const ()>,
}

impl RcuReadGuard<'_> {
    /// Whether this guard belongs to `domain`
    pub fn belongs_to(&self, domain: &GracePeriod) -> bool {
        core::ptr::eq(self.domain, domain)
    }
}

impl Drop for RcuReadGuard<'_> {
    fn drop(&mut self) {
        self.domain.leave(self.parity);
    }
}

/// Pointer handed to a reclamation callback
struct Retired<T>(*mut T);

// The pointee is only touched by the callback, after all readers are gone.
unsafe impl<T: Send> Send for Retired<T> {}

impl<T> Retired<T> {
    fn free(self) {
        // SAFETY: produced by `Box::into_raw` and unlinked from the cell.
        drop(unsafe { Box::from_raw(self.0) });
    }
}

/// RCU-protected value.
///
/// Readers get a reference bounded by their guard. Writers publish a new
/// value and retire the old one through a [`GracePeriod`].
pub(crate) struct RcuCell<T> {
    data: AtomicPtr<T>,
    _phantom: PhantomData<T>,
}

impl<T: Send + 'static> RcuCell<T> {
    /// Create a new RCU-protected value
    pub(crate) fn new(value: T) -> Self {
        Self {
            data: AtomicPtr::new(Box::into_raw(Box::new(value))),
            _phantom: PhantomData,
        }
    }

    /// Read the current value for the lifetime of `guard`
    #[inline]
    pub(crate) fn read<'g>(&'g self, _guard: &'g RcuReadGuard<'_>) -> &'g T {
        // SAFETY: values are freed only after a grace period, and the guard
        // keeps the current one open.
        unsafe { &*self.data.load(Ordering::SeqCst) }
    }

    /// Publish `updater(current)` and retire the current value.
    ///
    /// # Safety
    ///
    /// Updates must be serialized by the caller; two concurrent updates
    /// would both retire the same value.
    pub(crate) unsafe fn update<F>(&self, grace: &GracePeriod, updater: F)
    where
        F: FnOnce(&T) -> T,
    {
        let old_ptr = self.data.load(Ordering::SeqCst);
        // SAFETY: the caller is the only writer, so `old_ptr` is still live.
        let new_value = updater(unsafe { &*old_ptr });
        let prev = self.data.swap(Box::into_raw(Box::new(new_value)), Ordering::SeqCst);
        let retired = Retired(prev);
        grace.call(Box::new(move || retired.free()));
    }

    /// Current value, for the serialized writer
    ///
    /// # Safety
    ///
    /// Same contract as [`RcuCell::update`]: the caller must hold the lock
    /// that serializes updates for as long as the reference is used.
    pub(crate) unsafe fn current(&self) -> &T {
        // SAFETY: only an update can retire the value, and the caller
        // excludes updates.
        unsafe { &*self.data.load(Ordering::SeqCst) }
    }
}

impl<T> Drop for RcuCell<T> {
    fn drop(&mut self) {
        let ptr = *self.data.get_mut();
        if !ptr.is_null() {
            // SAFETY: readers borrow the cell, none are left.
            drop(unsafe { Box::from_raw(ptr) });
        }
    }
}

// SAFETY: the cell hands out shared references across threads and moves
// retired values to whichever thread runs the callback.
unsafe impl<T: Send + Sync> Send for RcuCell<T> {}
unsafe impl<T: Send + Sync> Sync for RcuCell<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use core::sync::atomic::AtomicBool;

    #[test]
    fn test_callback_waits_for_reader() {
        let gp = GracePeriod::new();
        let done = Arc::new(AtomicBool::new(false));

        let guard = gp.read_lock();
        let flag = done.clone();
        gp.call(Box::new(move || flag.store(true, Ordering::SeqCst)));

        assert_eq!(gp.poll(), 0);
        assert_eq!(gp.poll(), 0);
        assert!(!done.load(Ordering::SeqCst));

        // The last reader out runs the batch.
        drop(guard);
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(gp.poll(), 0);
    }

    #[test]
    fn test_new_reader_does_not_block_retired_batch() {
        let gp = GracePeriod::new();
        gp.call(Box::new(|| ()));
        // Flips the epoch; no reader on the old parity, so it completes.
        assert_eq!(gp.poll(), 1);

        let _late = gp.read_lock();
        gp.call(Box::new(|| ()));
        assert_eq!(gp.poll(), 0);
        assert_eq!(gp.pending(), 1);
        assert_eq!(gp.active_readers(), 1);
    }

    #[test]
    fn test_reader_after_flip_is_not_waited_on() {
        let gp = GracePeriod::new();
        let first = gp.read_lock();
        gp.call(Box::new(|| ()));
        assert_eq!(gp.poll(), 0);

        // Enters on the new parity.
        let second = gp.read_lock();
        drop(first);
        assert_eq!(gp.pending(), 0);
        assert!(second.belongs_to(&gp));
    }

    #[test]
    fn test_rcu_cell_update() {
        let gp = GracePeriod::new();
        let cell = RcuCell::new(42u32);
        {
            let guard = gp.read_lock();
            let old = cell.read(&guard);
            unsafe { cell.update(&gp, |v| *v + 1) };
            // The old value stays readable for this guard.
            assert_eq!(*old, 42);
            assert_eq!(*cell.read(&guard), 43);
            assert_eq!(gp.poll(), 0);
        }
        gp.synchronize();
        assert_eq!(gp.pending(), 0);
    }

    #[test]
    fn test_only_retired_parity_triggers_poll() {
        let gp = GracePeriod::new();
        let first = gp.read_lock();
        gp.call(Box::new(|| ()));
        assert_eq!(gp.poll(), 0);

        let second = gp.read_lock();
        gp.call(Box::new(|| ()));
        // Leaves the new parity while the retired one is still busy.
        drop(second);
        assert_eq!(gp.pending(), 2);

        // No readers left anywhere, so both batches complete.
        drop(first);
        assert_eq!(gp.pending(), 0);
        assert_eq!(gp.active_readers(), 0);
    }

    #[test]
    fn test_drop_runs_leftover_callbacks() {
        let done = Arc::new(AtomicBool::new(false));
        {
            let gp = GracePeriod::new();
            let flag = done.clone();
            gp.call(Box::new(move || flag.store(true, Ordering::SeqCst)));
        }
        assert!(done.load(Ordering::SeqCst));
    }
}
