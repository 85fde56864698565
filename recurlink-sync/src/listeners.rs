//! Scoped suspension of change listeners.
//!
//! Writing to the CRM from inside a CRM "record changed" callback would fire
//! that callback again. Every outbound write therefore holds a
//! [`ListenerGuard`] for [`Listener::RecordChanged`]; writes into the host from
//! a CRM callback hold one for [`Listener::SequenceSaved`].
//!
//! Guards are depth-1: a guard taken while the listener is already suspended
//! leaves it suspended when dropped, and only the outermost guard restores it.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

/// Callbacks the engine registers with the two systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Listener {
    /// The CRM reports an edited record.
    RecordChanged,
    /// The host reports a saved sequence.
    SequenceSaved,
}

/// Shared, request-scoped listener state. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct Listeners {
    suspended: Rc<RefCell<HashSet<Listener>>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self, listener: Listener) -> bool {
        !self.suspended.borrow().contains(&listener)
    }

    /// Suspend `listener` until the returned guard is dropped.
    #[must_use = "the listener is restored as soon as the guard is dropped"]
    pub fn suspend(&self, listener: Listener) -> ListenerGuard {
        let newly = self.suspended.borrow_mut().insert(listener);
        ListenerGuard {
            listeners: self.clone(),
            listener,
            restore: newly,
        }
    }
}

/// Restores a suspended listener on drop.
#[derive(Debug)]
pub struct ListenerGuard {
    listeners: Listeners,
    listener: Listener,
    restore: bool,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if self.restore {
            self.listeners.suspended.borrow_mut().remove(&self.listener);
        }
    }
}
