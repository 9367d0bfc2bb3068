//! Fire-and-forget event hooks with RAII connections
//!
//! Listeners are invoked after the scheduler has finished mutating its
//! state for the frame, so a listener cannot observe or corrupt a
//! half-updated pipeline. Connecting or disconnecting from inside a
//! listener is allowed.

use std::cell::RefCell;
use std::mem;
use std::rc::Rc;

type Listener<T> = Box<dyn FnMut(&T)>;

struct Inner<T> {
    next_id: u64,
    listeners: Vec<(u64, Listener<T>)>,
    dead: Vec<u64>,
}

/// A single event hook callers can connect listeners to.
pub struct Event<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T: 'static> Event<T> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                next_id: 0,
                listeners: Vec::new(),
                dead: Vec::new(),
            })),
        }
    }

    /// Attach a listener. Dropping the returned connection detaches it.
    pub fn connect(&self, listener: impl FnMut(&T) + 'static) -> EventConnection {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.listeners.push((id, Box::new(listener)));
            id
        };
        let inner = Rc::clone(&self.inner);
        EventConnection(Some(Box::new(move || {
            inner.borrow_mut().dead.push(id);
        })))
    }

    pub fn has_listeners(&self) -> bool {
        let inner = self.inner.borrow();
        inner
            .listeners
            .iter()
            .any(|(id, _)| !inner.dead.contains(id))
    }

    /// Invoke every live listener with `value`.
    pub fn fire(&self, value: &T) {
        // Listeners run outside the borrow so they may connect or
        // disconnect reentrantly.
        let mut active = {
            let mut inner = self.inner.borrow_mut();
            prune(&mut inner);
            mem::take(&mut inner.listeners)
        };
        for (_, listener) in active.iter_mut() {
            listener(value);
        }
        let mut inner = self.inner.borrow_mut();
        let added = mem::take(&mut inner.listeners);
        inner.listeners = active;
        inner.listeners.extend(added);
        prune(&mut inner);
    }
}

fn prune<T>(inner: &mut Inner<T>) {
    if inner.dead.is_empty() {
        return;
    }
    let dead = mem::take(&mut inner.dead);
    inner.listeners.retain(|(id, _)| !dead.contains(id));
}

impl<T: 'static> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Detaches its listener when dropped.
pub struct EventConnection(Option<Box<dyn FnOnce()>>);

impl EventConnection {
    pub fn disconnect(mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

impl Drop for EventConnection {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}
