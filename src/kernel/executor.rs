//! Deterministic cooperative task executor.
//!
//! All simulation activity runs as futures on a single-threaded executor
//! driven by the logical clock in [`super::time`]. The executor repeatedly
//! drains a FIFO ready queue, and only when no task can make progress does
//! it advance the clock to the earliest pending timer deadline. Wakers due
//! at the same tick are woken in registration order, so tasks scheduled for
//! the same moment resume in a stable first-come order.
//!
//! Tasks can be interrupted: an interrupt queues an opaque cause against the
//! target, which receives it as an `Err` the next time it parks on one of
//! the interrupt-aware suspension points ([`Sim::sleep`],
//! [`Sim::sleep_until`], [`TaskHandle::join`]). A task that does not handle
//! the error naturally unwinds out of its async body, terminating it.

use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Wake, Waker};

use futures::FutureExt;
use futures::future::LocalBoxFuture;

use super::time::{Duration, Instant};
use crate::logging;

type TaskId = u64;

/// Delivered to a task whose wait was cut short by another task.
///
/// The cause is an opaque value chosen by the interrupter; recipients
/// pattern-match on it with [`Interrupt::downcast`].
pub struct Interrupt {
    cause: Box<dyn Any>,
}

impl Interrupt {
    /// Recover the cause as a concrete type, or get the interrupt back
    /// unchanged.
    pub fn downcast<T: Any>(self) -> Result<Box<T>, Interrupt> {
        self.cause.downcast().map_err(|cause| Interrupt { cause })
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.cause.downcast_ref()
    }
}

impl std::fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interrupt").finish_non_exhaustive()
    }
}

struct TaskSlot {
    /// Taken out while the task is being polled.
    future: Option<LocalBoxFuture<'static, ()>>,
    /// Causes queued by interrupters, delivered one per resumption.
    interrupts: VecDeque<Box<dyn Any>>,
    /// Wakers of tasks parked on this task's completion.
    joiners: Vec<Waker>,
}

struct Core {
    now: Instant,
    next_id: TaskId,
    tasks: HashMap<TaskId, TaskSlot>,
    ready: VecDeque<TaskId>,
    /// Wakers keyed by their deadline; same-deadline wakers keep
    /// registration order.
    timers: BTreeMap<Instant, Vec<Waker>>,
    /// Task currently being polled, if any.
    current: Option<TaskId>,
}

/// Wakes are funneled through a shared queue so that `Waker`s (which must be
/// `Send + Sync`) never touch the single-threaded core directly.
struct WakeQueue {
    pending: Mutex<Vec<TaskId>>,
}

struct TaskWaker {
    queue: Arc<WakeQueue>,
    id: TaskId,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.queue.pending.lock().unwrap().push(self.id);
    }
}

/// Handle to the simulation executor.
///
/// Cheap to clone; every component that needs the clock, a timer or the
/// ability to spawn keeps one.
#[derive(Clone)]
pub struct Sim {
    core: Rc<RefCell<Core>>,
    wakes: Arc<WakeQueue>,
}

impl Sim {
    pub fn new() -> Sim {
        logging::set_sim_now(Instant::ZERO);
        Sim {
            core: Rc::new(RefCell::new(Core {
                now: Instant::ZERO,
                next_id: 0,
                tasks: HashMap::new(),
                ready: VecDeque::new(),
                timers: BTreeMap::new(),
                current: None,
            })),
            wakes: Arc::new(WakeQueue {
                pending: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Current logical time.
    pub fn now(&self) -> Instant {
        self.core.borrow().now
    }

    /// Register a future as a task. It starts running once the executor
    /// reaches it, within the current tick.
    pub fn spawn<F>(&self, future: F) -> TaskHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let output = Rc::new(RefCell::new(None));
        let slot_output = Rc::clone(&output);
        let wrapped = async move {
            *slot_output.borrow_mut() = Some(future.await);
        }
        .boxed_local();

        let mut core = self.core.borrow_mut();
        let id = core.next_id;
        core.next_id += 1;
        core.tasks.insert(
            id,
            TaskSlot {
                future: Some(wrapped),
                interrupts: VecDeque::new(),
                joiners: Vec::new(),
            },
        );
        core.ready.push_back(id);
        drop(core);

        TaskHandle {
            sim: self.clone(),
            id,
            output,
        }
    }

    /// Park the calling task for `duration`. Resolves immediately when the
    /// duration is zero, and with `Err` when the task is interrupted first.
    pub fn sleep(&self, duration: Duration) -> Sleep {
        self.sleep_until(self.now() + duration)
    }

    /// Park the calling task until `deadline`. A deadline at or before the
    /// current tick resolves immediately.
    pub fn sleep_until(&self, deadline: Instant) -> Sleep {
        Sleep {
            sim: self.clone(),
            deadline,
            registered: false,
        }
    }

    /// Run until no timer remains and every runnable task has parked or
    /// finished. Returns the final logical time.
    pub fn run(&self) -> Instant {
        self.run_inner(None)
    }

    /// Run until `until`, then stop with the clock set to exactly `until`.
    pub fn run_until(&self, until: Instant) -> Instant {
        self.run_inner(Some(until))
    }

    fn run_inner(&self, until: Option<Instant>) -> Instant {
        loop {
            self.drain_wakes();
            loop {
                let id = self.core.borrow_mut().ready.pop_front();
                let Some(id) = id else { break };
                self.poll_task(id);
                self.drain_wakes();
            }

            // Quiescent at the current tick; advance to the next deadline.
            let next = self.core.borrow().timers.keys().next().copied();
            match next {
                Some(deadline) if until.is_none_or(|u| deadline <= u) => {
                    let wakers = {
                        let mut core = self.core.borrow_mut();
                        core.now = deadline;
                        core.timers.remove(&deadline).unwrap_or_default()
                    };
                    logging::set_sim_now(deadline);
                    for waker in wakers {
                        waker.wake();
                    }
                }
                _ => {
                    let mut core = self.core.borrow_mut();
                    if let Some(u) = until
                        && core.now < u
                    {
                        core.now = u;
                    }
                    let now = core.now;
                    drop(core);
                    logging::set_sim_now(now);
                    return now;
                }
            }
        }
    }

    fn drain_wakes(&self) {
        let woken: Vec<TaskId> = {
            let mut pending = self.wakes.pending.lock().unwrap();
            pending.drain(..).collect()
        };
        if woken.is_empty() {
            return;
        }
        let mut core = self.core.borrow_mut();
        for id in woken {
            if core.tasks.contains_key(&id) && !core.ready.contains(&id) {
                core.ready.push_back(id);
            }
        }
    }

    fn poll_task(&self, id: TaskId) {
        let future = {
            let mut core = self.core.borrow_mut();
            let Some(slot) = core.tasks.get_mut(&id) else {
                return;
            };
            let Some(future) = slot.future.take() else {
                return;
            };
            core.current = Some(id);
            future
        };

        let mut future = future;
        let waker = Waker::from(Arc::new(TaskWaker {
            queue: Arc::clone(&self.wakes),
            id,
        }));
        let mut cx = Context::from_waker(&waker);
        let poll = future.as_mut().poll(&mut cx);

        match poll {
            Poll::Ready(()) => {
                let joiners = {
                    let mut core = self.core.borrow_mut();
                    core.current = None;
                    core.tasks
                        .remove(&id)
                        .map(|slot| slot.joiners)
                        .unwrap_or_default()
                };
                // Dropped outside the core borrow: the future's captures may
                // themselves hold Sim handles.
                drop(future);
                for waker in joiners {
                    waker.wake();
                }
            }
            Poll::Pending => {
                let mut core = self.core.borrow_mut();
                core.current = None;
                if let Some(slot) = core.tasks.get_mut(&id) {
                    slot.future = Some(future);
                }
            }
        }
    }

    fn interrupt_task(&self, id: TaskId, cause: Box<dyn Any>) {
        let mut core = self.core.borrow_mut();
        if let Some(slot) = core.tasks.get_mut(&id) {
            slot.interrupts.push_back(cause);
            if !core.ready.contains(&id) {
                core.ready.push_back(id);
            }
        }
    }

    /// Pop a queued interrupt for the task currently being polled.
    fn take_interrupt(&self) -> Option<Box<dyn Any>> {
        let mut core = self.core.borrow_mut();
        let id = core.current?;
        core.tasks.get_mut(&id)?.interrupts.pop_front()
    }
}

impl Default for Sim {
    fn default() -> Self {
        Sim::new()
    }
}

/// Handle to a spawned task.
pub struct TaskHandle<T> {
    sim: Sim,
    id: TaskId,
    output: Rc<RefCell<Option<T>>>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        TaskHandle {
            sim: self.sim.clone(),
            id: self.id,
            output: Rc::clone(&self.output),
        }
    }
}

impl<T> TaskHandle<T> {
    /// Whether the task has not yet run to completion.
    pub fn is_alive(&self) -> bool {
        self.sim.core.borrow().tasks.contains_key(&self.id)
    }

    /// Queue an interrupt cause against the task. Delivered at its next
    /// interrupt-aware suspension point; a no-op when the task has already
    /// finished.
    pub fn interrupt(&self, cause: impl Any) {
        self.sim.interrupt_task(self.id, Box::new(cause));
    }

    /// Wait for the task to finish and take its output. Resolves with `Err`
    /// when the *waiting* task is interrupted; the target keeps running and
    /// a fresh `join` on a clone of the handle can pick it up again.
    pub fn join(self) -> Join<T> {
        Join {
            handle: self,
            registered: false,
        }
    }
}

/// Future returned by [`Sim::sleep`] and [`Sim::sleep_until`].
pub struct Sleep {
    sim: Sim,
    deadline: Instant,
    registered: bool,
}

impl Future for Sleep {
    type Output = Result<(), Interrupt>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(cause) = this.sim.take_interrupt() {
            return Poll::Ready(Err(Interrupt { cause }));
        }
        let mut core = this.sim.core.borrow_mut();
        if core.now >= this.deadline {
            return Poll::Ready(Ok(()));
        }
        if !this.registered {
            core.timers
                .entry(this.deadline)
                .or_default()
                .push(cx.waker().clone());
            this.registered = true;
        }
        Poll::Pending
    }
}

/// Future returned by [`TaskHandle::join`].
pub struct Join<T> {
    handle: TaskHandle<T>,
    registered: bool,
}

impl<T> Future for Join<T> {
    type Output = Result<T, Interrupt>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(cause) = this.handle.sim.take_interrupt() {
            return Poll::Ready(Err(Interrupt { cause }));
        }
        let mut core = this.handle.sim.core.borrow_mut();
        match core.tasks.get_mut(&this.handle.id) {
            Some(slot) => {
                if !this.registered {
                    slot.joiners.push(cx.waker().clone());
                    this.registered = true;
                }
                Poll::Pending
            }
            None => {
                drop(core);
                let output = this
                    .handle
                    .output
                    .borrow_mut()
                    .take()
                    .expect("joined task finished without storing its output");
                Poll::Ready(Ok(output))
            }
        }
    }
}
