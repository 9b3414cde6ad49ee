use super::{Scheduler, Spawner, TimerHandle};
use futures::executor::{LocalPool, LocalSpawner as PoolSpawner};
use futures::future::LocalBoxFuture;
use futures::task::LocalSpawnExt;
use std::cell::RefCell;
use std::rc::Rc;

struct Pending {
    handle: TimerHandle,
    due_ms: u64,
    task: Box<dyn FnOnce()>,
}

#[derive(Default)]
struct Clock {
    now_ms: u64,
    next_id: i32,
    pending: Vec<Pending>,
}

/// Virtual-time scheduler: timers only fire from [`ManualScheduler::advance`].
#[derive(Clone, Default)]
pub(crate) struct ManualScheduler {
    clock: Rc<RefCell<Clock>>,
}

impl ManualScheduler {
    pub(crate) fn pending_count(&self) -> usize {
        self.clock.borrow().pending.len()
    }

    /// Move time forward, firing due timers in due order.
    ///
    /// Tasks run with no borrow held, so they may schedule or cancel timers.
    pub(crate) fn advance(&self, ms: u64) {
        let target = self.clock.borrow().now_ms + ms;
        loop {
            let next = {
                let mut clock = self.clock.borrow_mut();
                let due = clock
                    .pending
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.due_ms <= target)
                    .min_by_key(|(_, p)| (p.due_ms, p.handle.0))
                    .map(|(i, _)| i);
                match due {
                    Some(i) => {
                        let p = clock.pending.remove(i);
                        clock.now_ms = p.due_ms;
                        Some(p.task)
                    }
                    None => None,
                }
            };

            match next {
                Some(task) => task(),
                None => break,
            }
        }
        self.clock.borrow_mut().now_ms = target;
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay_ms: u32, task: Box<dyn FnOnce()>) -> TimerHandle {
        let mut clock = self.clock.borrow_mut();
        clock.next_id += 1;
        let handle = TimerHandle(clock.next_id);
        let due_ms = clock.now_ms + u64::from(delay_ms);
        clock.pending.push(Pending {
            handle,
            due_ms,
            task,
        });
        handle
    }

    fn cancel(&self, handle: TimerHandle) {
        self.clock
            .borrow_mut()
            .pending
            .retain(|p| p.handle != handle);
    }
}

/// Spawner over a `LocalPool`; tasks only make progress in [`PoolDriver::run`].
#[derive(Clone)]
pub(crate) struct PoolDriver {
    pool: Rc<RefCell<LocalPool>>,
    spawner: PoolSpawner,
}

impl PoolDriver {
    pub(crate) fn new() -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self {
            pool: Rc::new(RefCell::new(pool)),
            spawner,
        }
    }

    pub(crate) fn run(&self) {
        self.pool.borrow_mut().run_until_stalled();
    }
}

impl Spawner for PoolDriver {
    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        let _ = self.spawner.spawn_local(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_timers_fire_only_when_due() {
        let s = ManualScheduler::default();
        let fired = Rc::new(Cell::new(0));
        let f2 = fired.clone();
        s.schedule(100, Box::new(move || f2.set(f2.get() + 1)));

        s.advance(99);
        assert_eq!(fired.get(), 0);
        s.advance(1);
        assert_eq!(fired.get(), 1);
        assert_eq!(s.pending_count(), 0);
    }

    #[test]
    fn test_cancelled_timer_never_fires() {
        let s = ManualScheduler::default();
        let fired = Rc::new(Cell::new(false));
        let f2 = fired.clone();
        let h = s.schedule(10, Box::new(move || f2.set(true)));
        s.cancel(h);
        s.advance(1000);
        assert!(!fired.get());
    }
}
