//! Single-owner wrapper around plain handle values
//!
//! `RaiiWrapper` stores one value and runs a teardown strategy for it exactly
//! once. The "nothing held" state is the value's `Default` (the null handle for
//! every `ash::vk` handle type), so destroying an empty or moved-from wrapper
//! is a no-op.

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

/// Strategy invoked with the owned value when a wrapper is destroyed
pub trait Teardown<T> {
    /// Release the resource behind `value`
    fn teardown(&mut self, value: T);
}

impl<T, F> Teardown<T> for F
where
    F: FnMut(T),
{
    fn teardown(&mut self, value: T) {
        self(value);
    }
}

/// Teardown strategy that does nothing (plain data carried by value)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoTeardown;

impl<T> Teardown<T> for NoTeardown {
    fn teardown(&mut self, _value: T) {}
}

/// Copy policy: the wrapper is move-only
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Unique;

/// Copy policy: the wrapper can be cloned and compared by held value
///
/// Cloning duplicates the raw value only. Use it for handles whose native
/// resource is reference counted elsewhere, or with [`NoTeardown`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Copyable;

/// Owns one `T` and tears it down once when dropped
///
/// # Type parameters
/// * `T` - carried value; `T::default()` is the sentinel
/// * `D` - teardown strategy
/// * `P` - copy policy, [`Unique`] or [`Copyable`]
pub struct RaiiWrapper<T, D = NoTeardown, P = Unique>
where
    T: Default + PartialEq,
    D: Teardown<T>,
{
    value: T,
    teardown: D,
    _policy: PhantomData<P>,
}

impl<T, P> RaiiWrapper<T, NoTeardown, P>
where
    T: Default + PartialEq,
{
    /// Wrap a value that needs no teardown
    pub fn new(value: T) -> Self {
        Self::with_teardown(value, NoTeardown)
    }
}

impl<T, D, P> RaiiWrapper<T, D, P>
where
    T: Default + PartialEq,
    D: Teardown<T>,
{
    /// Wrap `value`, releasing it with `teardown` when dropped
    pub fn with_teardown(value: T, teardown: D) -> Self {
        Self {
            value,
            teardown,
            _policy: PhantomData,
        }
    }

    /// Create a wrapper holding the sentinel
    ///
    /// Useful when a native call fills the value in place through
    /// [`as_mut_ptr`](Self::as_mut_ptr).
    pub fn null(teardown: D) -> Self {
        Self::with_teardown(T::default(), teardown)
    }

    /// Whether the wrapper currently holds the sentinel
    pub fn is_null(&self) -> bool {
        self.value == T::default()
    }

    /// Borrow the held value
    pub fn get(&self) -> &T {
        &self.value
    }

    /// Mutably borrow the held value
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.value
    }

    /// Raw pointer to the held value, for out-parameter style APIs
    pub fn as_mut_ptr(&mut self) -> *mut T {
        &mut self.value
    }

    /// The teardown strategy, e.g. the captured parent handle
    pub fn strategy(&self) -> &D {
        &self.teardown
    }

    /// Run teardown if a value is held and leave the sentinel behind
    ///
    /// Calling this again, or on a null wrapper, does nothing.
    pub fn destroy(&mut self) {
        if self.is_null() {
            return;
        }
        let value = std::mem::take(&mut self.value);
        self.teardown.teardown(value);
    }

    /// Give up ownership without running teardown
    pub fn release(&mut self) -> T {
        std::mem::take(&mut self.value)
    }

    /// Destroy the current value and take ownership of `value`
    pub fn reset(&mut self, value: T) {
        self.destroy();
        self.value = value;
    }

    /// Move ownership into a new wrapper, leaving this one null
    ///
    /// The source keeps its strategy but holds the sentinel, so dropping it
    /// never runs teardown.
    #[must_use]
    pub fn take(&mut self) -> Self
    where
        D: Clone,
    {
        Self::with_teardown(self.release(), self.teardown.clone())
    }
}

impl<T, D, P> Drop for RaiiWrapper<T, D, P>
where
    T: Default + PartialEq,
    D: Teardown<T>,
{
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<T, D, P> Default for RaiiWrapper<T, D, P>
where
    T: Default + PartialEq,
    D: Teardown<T> + Default,
{
    fn default() -> Self {
        Self::null(D::default())
    }
}

impl<T, D, P> Deref for RaiiWrapper<T, D, P>
where
    T: Default + PartialEq,
    D: Teardown<T>,
{
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T, D, P> DerefMut for RaiiWrapper<T, D, P>
where
    T: Default + PartialEq,
    D: Teardown<T>,
{
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T, D, P> AsRef<T> for RaiiWrapper<T, D, P>
where
    T: Default + PartialEq,
    D: Teardown<T>,
{
    fn as_ref(&self) -> &T {
        &self.value
    }
}

impl<T, D, P> AsMut<T> for RaiiWrapper<T, D, P>
where
    T: Default + PartialEq,
    D: Teardown<T>,
{
    fn as_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T, D, P> fmt::Debug for RaiiWrapper<T, D, P>
where
    T: Default + PartialEq + fmt::Debug,
    D: Teardown<T>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RaiiWrapper")
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}

impl<T, D> Clone for RaiiWrapper<T, D, Copyable>
where
    T: Default + PartialEq + Clone,
    D: Teardown<T> + Clone,
{
    fn clone(&self) -> Self {
        Self::with_teardown(self.value.clone(), self.teardown.clone())
    }
}

impl<T, D> PartialEq for RaiiWrapper<T, D, Copyable>
where
    T: Default + PartialEq,
    D: Teardown<T>,
{
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T, D> Eq for RaiiWrapper<T, D, Copyable>
where
    T: Default + Eq,
    D: Teardown<T>,
{
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<u64>>>;

    fn recorder(log: &Log) -> impl FnMut(u64) + Clone {
        let log = Rc::clone(log);
        move |value| log.borrow_mut().push(value)
    }

    #[test]
    fn test_sentinel_never_torn_down() {
        let log = Log::default();
        let wrapper: RaiiWrapper<u64, _> = RaiiWrapper::null(recorder(&log));
        assert!(wrapper.is_null());
        drop(wrapper);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_live_value_torn_down_once() {
        let log = Log::default();
        let mut wrapper: RaiiWrapper<u64, _> = RaiiWrapper::with_teardown(7, recorder(&log));
        wrapper.destroy();
        assert!(wrapper.is_null());
        assert_eq!(*wrapper.get(), 0);

        wrapper.destroy();
        drop(wrapper);
        assert_eq!(*log.borrow(), vec![7]);
    }

    #[test]
    fn test_take_leaves_source_null() {
        let log = Log::default();
        let mut first: RaiiWrapper<u64, _> = RaiiWrapper::with_teardown(42, recorder(&log));
        let second = first.take();

        assert!(first.is_null());
        assert_eq!(*second, 42);

        drop(first);
        assert!(log.borrow().is_empty());
        drop(second);
        assert_eq!(*log.borrow(), vec![42]);
    }

    #[test]
    fn test_release_skips_teardown() {
        let log = Log::default();
        let mut wrapper: RaiiWrapper<u64, _> = RaiiWrapper::with_teardown(3, recorder(&log));
        assert_eq!(wrapper.release(), 3);
        drop(wrapper);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_reset_destroys_previous_value() {
        let log = Log::default();
        let mut wrapper: RaiiWrapper<u64, _> = RaiiWrapper::with_teardown(1, recorder(&log));
        wrapper.reset(2);
        assert_eq!(*log.borrow(), vec![1]);
        drop(wrapper);
        assert_eq!(*log.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_out_parameter_fill() {
        let log = Log::default();
        let mut wrapper: RaiiWrapper<u64, _> = RaiiWrapper::null(recorder(&log));
        unsafe {
            *wrapper.as_mut_ptr() = 99;
        }
        assert!(!wrapper.is_null());
        drop(wrapper);
        assert_eq!(*log.borrow(), vec![99]);
    }

    #[test]
    fn test_copyable_compares_values() {
        let a: RaiiWrapper<u32, NoTeardown, Copyable> = RaiiWrapper::new(5);
        let b = a.clone();
        let c: RaiiWrapper<u32, NoTeardown, Copyable> = RaiiWrapper::new(6);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_deref_mut_exposes_value() {
        let mut wrapper: RaiiWrapper<Vec<u8>> = RaiiWrapper::default();
        assert!(wrapper.is_null());
        wrapper.push(1);
        assert_eq!(wrapper.len(), 1);
    }
}
