//! Timers and task spawning, abstracted so the note session can be driven by
//! the browser event loop in production and by a manual clock in tests.

#[cfg(test)]
pub(crate) mod manual;

use futures::future::LocalBoxFuture;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerHandle(pub i32);

pub trait Scheduler {
    /// Run `task` once after `delay_ms`.
    fn schedule(&self, delay_ms: u32, task: Box<dyn FnOnce()>) -> TimerHandle;

    /// Cancelling an already fired or unknown handle is a no-op.
    fn cancel(&self, handle: TimerHandle);
}

pub trait Spawner {
    fn spawn(&self, task: LocalBoxFuture<'static, ()>);
}

/// `window.setTimeout` backed scheduler.
#[derive(Clone, Copy, Debug, Default)]
pub struct BrowserScheduler;

impl Scheduler for BrowserScheduler {
    fn schedule(&self, delay_ms: u32, task: Box<dyn FnOnce()>) -> TimerHandle {
        let Some(win) = web_sys::window() else {
            return TimerHandle(0);
        };

        let cb = Closure::once_into_js(move || task());
        let delay = i32::try_from(delay_ms).unwrap_or(i32::MAX);
        let tid = win
            .set_timeout_with_callback_and_timeout_and_arguments_0(cb.as_ref().unchecked_ref(), delay)
            .unwrap_or(0);

        TimerHandle(tid)
    }

    fn cancel(&self, handle: TimerHandle) {
        if let Some(win) = web_sys::window() {
            win.clear_timeout_with_handle(handle.0);
        }
    }
}

/// Spawns onto the Leptos local executor.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalSpawner;

impl Spawner for LocalSpawner {
    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        leptos::task::spawn_local(task);
    }
}

/// Repeating `window.setInterval`. Cleared on drop.
pub(crate) struct IntervalHandle {
    id: i32,
    _cb: Closure<dyn FnMut()>,
}

impl IntervalHandle {
    pub(crate) fn start(interval_ms: u32, tick: impl FnMut() + 'static) -> Option<Self> {
        let win = web_sys::window()?;
        let cb = Closure::wrap(Box::new(tick) as Box<dyn FnMut()>);
        let interval = i32::try_from(interval_ms).unwrap_or(i32::MAX);
        let id = win
            .set_interval_with_callback_and_timeout_and_arguments_0(
                cb.as_ref().unchecked_ref(),
                interval,
            )
            .ok()?;
        Some(Self { id, _cb: cb })
    }
}

impl Drop for IntervalHandle {
    fn drop(&mut self) {
        if let Some(win) = web_sys::window() {
            win.clear_interval_with_handle(self.id);
        }
    }
}
