//! A generic spin lock guarding a value.
//!
//! A small, general-purpose primitive for data that is *not* the process table --
//! the process table has its own [`crate::proc::table::TableLock`], which
//! additionally disables local interrupts while held. This one backs
//! ambient concerns such as the console print lock.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

pub struct Spinlock<T> {
    locked: AtomicBool,
    inner: UnsafeCell<T>,
}
impl<T> Spinlock<T> {
    pub const fn new(value: T) -> Spinlock<T> {
        Spinlock {
            locked: AtomicBool::new(false),
            inner: UnsafeCell::new(value),
        }
    }
    pub fn lock(&self) -> SpinlockGuard<'_, T> {
        while self.locked.swap(true, Ordering::Acquire) {
            core::hint::spin_loop();
        }
        SpinlockGuard { lock: self }
    }
}
unsafe impl<T> Sync for Spinlock<T> where T: Send {}

pub struct SpinlockGuard<'l, T> {
    lock: &'l Spinlock<T>,
}
impl<'l, T> Deref for SpinlockGuard<'l, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.inner.get() }
    }
}
impl<'l, T> DerefMut for SpinlockGuard<'l, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.inner.get() }
    }
}
impl<'l, T> Drop for SpinlockGuard<'l, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}
