//! Scheduler: sole owner of every simulation timer
//!
//! Repeating timers are keyed by name so starting one twice never doubles
//! its rate. One-shot timers are tracked until they fire; when a one-shot's
//! delay has elapsed its action moves to a detached task, so `cancel_all`
//! stops pending timers without preempting work that already started.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Default)]
struct Timers {
    repeating: HashMap<String, JoinHandle<()>>,
    oneshots: Vec<JoinHandle<()>>,
}

#[derive(Clone, Default)]
pub struct Scheduler {
    timers: Arc<Mutex<Timers>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a repeating timer. `period` is sampled before every tick.
    ///
    /// Returns false, leaving the running timer untouched, if a live timer
    /// with this name already exists. The timer ends on its own when `tick`
    /// returns `ControlFlow::Break`.
    pub fn every<P, T>(&self, name: impl Into<String>, mut period: P, mut tick: T) -> bool
    where
        P: FnMut() -> Duration + Send + 'static,
        T: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let name = name.into();
        let mut timers = self.timers.lock();
        if let Some(existing) = timers.repeating.get(&name) {
            if !existing.is_finished() {
                return false;
            }
        }

        let label = name.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(period()).await;
                if tick().is_break() {
                    debug!("Timer {} finished", label);
                    break;
                }
            }
        });
        timers.repeating.insert(name, handle);
        true
    }

    /// Run `action` once after `delay`
    pub fn after<F>(&self, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(action);
        });
        let mut timers = self.timers.lock();
        timers.oneshots.retain(|h| !h.is_finished());
        timers.oneshots.push(handle);
    }

    pub fn is_scheduled(&self, name: &str) -> bool {
        self.timers
            .lock()
            .repeating
            .get(name)
            .is_some_and(|h| !h.is_finished())
    }

    /// Cancel one repeating timer; a no-op when it is not running
    pub fn cancel(&self, name: &str) -> bool {
        match self.timers.lock().repeating.remove(name) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Number of repeating and one-shot timers that have not finished
    pub fn pending(&self) -> usize {
        let timers = self.timers.lock();
        timers
            .repeating
            .values()
            .chain(timers.oneshots.iter())
            .filter(|h| !h.is_finished())
            .count()
    }

    pub fn cancel_all(&self) {
        let mut timers = self.timers.lock();
        let count = timers.repeating.len() + timers.oneshots.len();
        for (_, handle) in timers.repeating.drain() {
            handle.abort();
        }
        for handle in timers.oneshots.drain(..) {
            handle.abort();
        }
        if count > 0 {
            debug!("Cancelled {} timer(s)", count);
        }
    }
}
