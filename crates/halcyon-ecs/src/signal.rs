use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Receives events dispatched through a [`Signal`].
pub trait Listener<E> {
    fn receive(&mut self, event: &E);
}

/// Blanket implementation so closures can be used as listeners.
impl<E, F: FnMut(&E)> Listener<E> for F {
    fn receive(&mut self, event: &E) {
        (self)(event)
    }
}

/// Handle for removing a listener from the signal that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A minimal synchronous multicast dispatcher.
///
/// Listeners fire in registration order, on the dispatching thread. The
/// listener list is snapshotted at dispatch start, so a listener registered
/// during a dispatch first fires on the *next* dispatch, and removals during
/// a dispatch never skip or double-invoke unrelated listeners.
///
/// A panicking listener aborts the remaining dispatch and the panic
/// propagates to the caller.
///
/// Single-threaded by design, like the engine that uses it.
pub struct Signal<E> {
    listeners: RefCell<Vec<(ListenerId, Rc<RefCell<dyn Listener<E>>>)>>,
    next_id: Cell<u64>,
}

impl<E> Signal<E> {
    pub fn new() -> Self {
        Self {
            listeners: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    /// Register a listener; it will fire on every subsequent dispatch until
    /// removed.
    pub fn add(&self, listener: Rc<RefCell<dyn Listener<E>>>) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, listener));
        id
    }

    /// Register a closure listener.
    pub fn connect(&self, listener: impl FnMut(&E) + 'static) -> ListenerId {
        self.add(Rc::new(RefCell::new(listener)))
    }

    /// Remove a listener. Unknown ids are a no-op; returns whether a
    /// listener was removed.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Invoke every currently-registered listener with `event`, in
    /// registration order.
    pub fn dispatch(&self, event: &E) {
        let snapshot: Vec<_> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in snapshot {
            listener.borrow_mut().receive(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.borrow().is_empty()
    }
}

impl<E> Default for Signal<E> {
    fn default() -> Self {
        Self::new()
    }
}
