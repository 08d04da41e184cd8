//! One-shot broadcast events that re-arm on every completion.
//!
//! A [`SharedEvent`] is a slot holding the *current* one-shot event.
//! [`SharedEvent::reactivate`] resolves that one-shot for everyone already
//! listening and atomically swaps a fresh one into the slot, so long-lived
//! holders that call [`SharedEvent::listen`] afterwards always attach to a
//! live, unresolved event. This is the wake-up mechanism between radios and
//! the world: the set of listeners is unknown to the reactivator and may
//! change every tick.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

struct OneShot<T> {
    fired: Option<T>,
    /// Parked listeners, keyed so a listener can replace or remove its own
    /// waker without disturbing the others.
    waiters: Vec<(u64, Waker)>,
    next_key: u64,
}

impl<T> OneShot<T> {
    fn new() -> OneShot<T> {
        OneShot {
            fired: None,
            waiters: Vec::new(),
            next_key: 0,
        }
    }
}

/// A re-arming one-shot event, shareable between tasks.
pub struct SharedEvent<T> {
    current: RefCell<Rc<RefCell<OneShot<T>>>>,
}

impl<T: Clone> SharedEvent<T> {
    pub fn new() -> SharedEvent<T> {
        SharedEvent {
            current: RefCell::new(Rc::new(RefCell::new(OneShot::new()))),
        }
    }

    /// Attach to the current one-shot. The returned future resolves with the
    /// value passed to the `reactivate` call that fires it, and keeps
    /// resolving with that value if polled again later in the tick.
    pub fn listen(&self) -> EventListener<T> {
        EventListener {
            shot: Rc::clone(&self.current.borrow()),
            key: None,
        }
    }

    /// Fire the current one-shot, waking every parked listener with a clone
    /// of `value`, and re-arm with a fresh one-shot for future listeners.
    pub fn reactivate(&self, value: T) {
        let fresh = Rc::new(RefCell::new(OneShot::new()));
        let fired = self.current.replace(fresh);
        let waiters = {
            let mut shot = fired.borrow_mut();
            shot.fired = Some(value);
            std::mem::take(&mut shot.waiters)
        };
        for (_, waker) in waiters {
            waker.wake();
        }
    }
}

impl<T: Clone> Default for SharedEvent<T> {
    fn default() -> Self {
        SharedEvent::new()
    }
}

/// Future returned by [`SharedEvent::listen`].
pub struct EventListener<T> {
    shot: Rc<RefCell<OneShot<T>>>,
    key: Option<u64>,
}

impl<T: Clone> Future for EventListener<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut shot = this.shot.borrow_mut();
        if let Some(value) = shot.fired.as_ref() {
            return Poll::Ready(value.clone());
        }
        match this.key {
            Some(key) => {
                if let Some(entry) = shot.waiters.iter_mut().find(|(k, _)| *k == key) {
                    entry.1 = cx.waker().clone();
                }
            }
            None => {
                let key = shot.next_key;
                shot.next_key += 1;
                shot.waiters.push((key, cx.waker().clone()));
                this.key = Some(key);
            }
        }
        Poll::Pending
    }
}

impl<T> Drop for EventListener<T> {
    fn drop(&mut self) {
        if let Some(key) = self.key {
            self.shot.borrow_mut().waiters.retain(|(k, _)| *k != key);
        }
    }
}

/// Wait until at least one listener fires, then return every listener that
/// has fired by that moment as `(index, value)` pairs.
///
/// Listeners that fire within the same tick are all collected in one
/// resumption, so a consumer watching many events never loses a co-firing
/// one.
pub fn any_of<T: Clone>(listeners: Vec<EventListener<T>>) -> AnyOf<T> {
    AnyOf {
        listeners: listeners.into_iter().map(Some).collect(),
    }
}

/// Future returned by [`any_of`].
pub struct AnyOf<T> {
    listeners: Vec<Option<EventListener<T>>>,
}

impl<T: Clone> Future for AnyOf<T> {
    type Output = Vec<(usize, T)>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut fired = Vec::new();
        for (index, slot) in this.listeners.iter_mut().enumerate() {
            if let Some(listener) = slot {
                match Pin::new(listener).poll(cx) {
                    Poll::Ready(value) => {
                        fired.push((index, value));
                        *slot = None;
                    }
                    Poll::Pending => {}
                }
            }
        }
        if fired.is_empty() {
            Poll::Pending
        } else {
            Poll::Ready(fired)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::executor::Sim;
    use crate::kernel::time::Duration;
    use std::cell::Cell;

    #[test]
    fn listeners_receive_the_reactivation_value() {
        let sim = Sim::new();
        let event = Rc::new(SharedEvent::new());
        let got = Rc::new(Cell::new(0));

        let seen = Rc::clone(&got);
        let waiting = Rc::clone(&event);
        sim.spawn(async move {
            seen.set(waiting.listen().await);
        });

        let inner = sim.clone();
        sim.spawn(async move {
            inner.sleep(Duration::from_units(1)).await.unwrap();
            event.reactivate(7);
        });

        sim.run();
        assert_eq!(got.get(), 7);
    }

    #[test]
    fn reactivation_rearms_for_later_listeners() {
        let sim = Sim::new();
        let event = Rc::new(SharedEvent::new());
        let values = Rc::new(RefCell::new(Vec::new()));

        let seen = Rc::clone(&values);
        let waiting = Rc::clone(&event);
        sim.spawn(async move {
            // Each listen() call attaches to the one-shot current at that
            // moment, so consecutive waits observe consecutive firings.
            let first = waiting.listen().await;
            let second = waiting.listen().await;
            seen.borrow_mut().extend([first, second]);
        });

        let inner = sim.clone();
        sim.spawn(async move {
            inner.sleep(Duration::from_units(1)).await.unwrap();
            event.reactivate(1);
            inner.sleep(Duration::from_units(1)).await.unwrap();
            event.reactivate(2);
        });

        sim.run();
        assert_eq!(*values.borrow(), vec![1, 2]);
    }

    #[test]
    fn a_listener_attached_before_the_firing_latches_the_value() {
        let sim = Sim::new();
        let event = Rc::new(SharedEvent::new());
        let got = Rc::new(Cell::new(0));

        let listener = event.listen();
        event.reactivate(9);

        let seen = Rc::clone(&got);
        sim.spawn(async move {
            seen.set(listener.await);
        });
        sim.run();
        assert_eq!(got.get(), 9);
    }

    #[test]
    fn any_of_collects_every_event_fired_in_the_same_tick() {
        let sim = Sim::new();
        let left = Rc::new(SharedEvent::new());
        let right = Rc::new(SharedEvent::new());
        let collected = Rc::new(RefCell::new(Vec::new()));

        let seen = Rc::clone(&collected);
        let listeners = vec![left.listen(), right.listen()];
        sim.spawn(async move {
            *seen.borrow_mut() = any_of(listeners).await;
        });

        let inner = sim.clone();
        sim.spawn(async move {
            inner.sleep(Duration::from_units(2)).await.unwrap();
            left.reactivate("L");
            right.reactivate("R");
        });

        sim.run();
        assert_eq!(*collected.borrow(), vec![(0, "L"), (1, "R")]);
    }
}
