//! Per-node schedule dispatch.
//!
//! The manager owns a node's schedules and a long-running task that sleeps
//! until the earliest due firing, then drives the radio accordingly.
//! Adding a schedule interrupts that sleep, because the newcomer may be due
//! earlier than whatever the manager was waiting on; an idle manager (no
//! schedules at all) parks on a shared event instead and is woken by the
//! first `add`.

use std::cell::RefCell;
use std::rc::Rc;

use log::debug;

use crate::kernel::time::Instant;
use crate::kernel::{SharedEvent, Sim, TaskHandle};
use crate::node::Protocol;
use crate::radio::{Radio, RadioMode};
use crate::schedule::{Schedule, ScheduleFiring, ScheduleState};

/// Log record of one planned schedule firing, materialised on `add`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEvent {
    pub start: Instant,
    pub stop: Instant,
    pub mode: RadioMode,
}

/// Communication schedule management for one radio.
pub struct ScheduleManager {
    sim: Sim,
    radio: Rc<Radio>,
    protocol: Rc<dyn Protocol>,
    schedules: RefCell<Vec<Rc<RefCell<Schedule>>>>,
    event_log: RefCell<Vec<ScheduleEvent>>,
    awaiting_schedules: SharedEvent<()>,
    manager_task: RefCell<Option<TaskHandle<()>>>,
}

impl ScheduleManager {
    /// Create the manager and start its dispatch task.
    pub fn new(sim: &Sim, radio: Rc<Radio>, protocol: Rc<dyn Protocol>) -> Rc<ScheduleManager> {
        let manager = Rc::new(ScheduleManager {
            sim: sim.clone(),
            radio,
            protocol,
            schedules: RefCell::new(Vec::new()),
            event_log: RefCell::new(Vec::new()),
            awaiting_schedules: SharedEvent::new(),
            manager_task: RefCell::new(None),
        });
        let task = sim.spawn(Rc::clone(&manager).run());
        *manager.manager_task.borrow_mut() = Some(task);
        manager
    }

    /// Register a schedule. Its planned firings are logged immediately and
    /// the dispatch task re-evaluates which schedule is due next.
    pub fn add(&self, schedule: Schedule) -> bool {
        // Idle means the dispatch task is parked on the awaiting event: no
        // schedules at all, or none in a selectable state.
        let was_idle = self.next_active_schedule().is_none();

        {
            let mut log = self.event_log.borrow_mut();
            for k in 0..schedule.num() {
                let start = schedule.start() + schedule.delay() * k;
                log.push(ScheduleEvent {
                    start,
                    stop: start + schedule.duration(),
                    mode: schedule.mode(),
                });
            }
        }

        debug!(
            "[{}] schedule added at {}: {}",
            self.radio.name(),
            self.sim.now(),
            schedule
        );
        self.schedules
            .borrow_mut()
            .push(Rc::new(RefCell::new(schedule)));

        // The newcomer may be due before whatever the manager is sleeping
        // towards.
        if let Some(task) = self.manager_task.borrow().as_ref() {
            task.interrupt("schedule list changed");
        }
        if was_idle {
            self.awaiting_schedules.reactivate(());
        }

        debug!(
            "[{}] {} schedule(s) now registered",
            self.radio.name(),
            self.schedules.borrow().len()
        );
        true
    }

    /// Planned firings of every schedule ever added, in `add` order.
    pub fn event_log(&self) -> Vec<ScheduleEvent> {
        self.event_log.borrow().clone()
    }

    /// The active schedule due soonest; earlier-inserted wins ties.
    fn next_active_schedule(&self) -> Option<(Rc<RefCell<Schedule>>, Instant)> {
        let mut best: Option<(Rc<RefCell<Schedule>>, Instant)> = None;
        for entry in self.schedules.borrow().iter() {
            let schedule = entry.borrow();
            if schedule.state() != ScheduleState::Active {
                continue;
            }
            let Ok(due) = schedule.next_time() else {
                continue;
            };
            match &best {
                Some((_, soonest)) if *soonest <= due => {}
                _ => best = Some((Rc::clone(entry), due)),
            }
        }
        best
    }

    async fn run(self: Rc<Self>) {
        loop {
            let Some((schedule, due)) = self.next_active_schedule() else {
                self.awaiting_schedules.listen().await;
                continue;
            };

            // A due time already in the past resolves immediately, so a
            // schedule added late still fires (at the current tick).
            if self.sim.sleep_until(due).await.is_err() {
                debug!("[{}] manager re-selecting", self.radio.name());
                continue;
            }

            let firing = schedule.borrow_mut().event();
            match firing {
                Some(ScheduleFiring::Transmit(packet)) => {
                    let duration = schedule.borrow().duration();
                    self.sim
                        .spawn(Rc::clone(&self.radio).transmit(duration, packet));
                }
                Some(ScheduleFiring::Receive(duration)) => {
                    let window = self.sim.spawn(Rc::clone(&self.radio).receive(duration));
                    let received = loop {
                        match window.clone().join().await {
                            Ok(received) => break received,
                            Err(_) => {
                                // Re-selection can wait until the open
                                // window runs out.
                                debug!(
                                    "[{}] manager interrupted during an RX window",
                                    self.radio.name()
                                );
                            }
                        }
                    };
                    self.protocol.handle_packet(received);
                }
                None => {}
            }

            if schedule.borrow().state() == ScheduleState::Complete {
                self.schedules
                    .borrow_mut()
                    .retain(|entry| !Rc::ptr_eq(entry, &schedule));
            }
        }
    }
}
