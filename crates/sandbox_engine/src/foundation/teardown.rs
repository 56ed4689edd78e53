//! Ordered teardown of heterogeneous owners
//!
//! Rust drops struct fields in declaration order, which is the opposite of
//! what parent/child native handles need and silently breaks when fields get
//! reordered. `TeardownStack` makes the order explicit: entries are destroyed
//! in reverse insertion order, so pushing parents first guarantees children go
//! first.

use super::raii::{RaiiWrapper, Teardown};

/// Anything that can release its resource on demand
pub trait Destroy {
    /// Release the resource; must be safe to call more than once
    fn destroy(&mut self);

    /// Name used in teardown diagnostics
    fn label(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<T, D, P> Destroy for RaiiWrapper<T, D, P>
where
    T: Default + PartialEq,
    D: Teardown<T>,
{
    fn destroy(&mut self) {
        RaiiWrapper::destroy(self);
    }
}

/// Owns destroyables and tears them down last-in, first-out
#[derive(Default)]
pub struct TeardownStack {
    entries: Vec<Box<dyn Destroy>>,
}

impl TeardownStack {
    /// Create an empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an owner; it is destroyed before everything pushed earlier
    pub fn push<R>(&mut self, resource: R)
    where
        R: Destroy + 'static,
    {
        self.entries.push(Box::new(resource));
    }

    /// Take ownership of a wrapper and hand back its raw value
    ///
    /// The stack stays responsible for teardown; the returned copy is only
    /// valid until the stack is torn down.
    pub fn adopt<T, D, P>(&mut self, wrapper: RaiiWrapper<T, D, P>) -> T
    where
        T: Default + PartialEq + Copy + 'static,
        D: Teardown<T> + 'static,
        P: 'static,
    {
        let value = *wrapper.get();
        self.push(wrapper);
        value
    }

    /// Number of owners still held
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the stack holds nothing
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Destroy every entry, newest first
    pub fn teardown_all(&mut self) {
        while let Some(mut entry) = self.entries.pop() {
            log::trace!("Tearing down {}", entry.label());
            entry.destroy();
        }
    }
}

impl Drop for TeardownStack {
    fn drop(&mut self) {
        self.teardown_all();
    }
}

impl std::fmt::Debug for TeardownStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeardownStack")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn tagged(log: &Rc<RefCell<Vec<u64>>>, value: u64) -> RaiiWrapper<u64, impl FnMut(u64) + 'static> {
        let log = Rc::clone(log);
        RaiiWrapper::with_teardown(value, move |v| log.borrow_mut().push(v))
    }

    #[test]
    fn test_reverse_insertion_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut stack = TeardownStack::new();
        stack.push(tagged(&log, 1));
        stack.push(tagged(&log, 2));
        stack.push(tagged(&log, 3));
        assert_eq!(stack.len(), 3);

        drop(stack);
        assert_eq!(*log.borrow(), vec![3, 2, 1]);
    }

    #[test]
    fn test_adopt_returns_raw_value() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut stack = TeardownStack::new();
        let raw = stack.adopt(tagged(&log, 11));
        assert_eq!(raw, 11);
        assert!(log.borrow().is_empty());

        stack.teardown_all();
        assert!(stack.is_empty());
        assert_eq!(*log.borrow(), vec![11]);

        // A second pass has nothing left to destroy
        stack.teardown_all();
        assert_eq!(*log.borrow(), vec![11]);
    }

    #[test]
    fn test_null_entries_skip_teardown() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut stack = TeardownStack::new();
        stack.push(tagged(&log, 0));
        stack.push(tagged(&log, 5));
        drop(stack);
        assert_eq!(*log.borrow(), vec![5]);
    }
}
