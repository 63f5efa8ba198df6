//! Per-URL fetch coordination and the table of synthesized types

use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, trace};

use super::flat::FlatDescription;
use super::Registered;
use crate::error::{ReflectError, Result};

enum Slot {
    /// A fetch is running on the given thread
    Fetching(ThreadId),
    Fetched(Arc<FlatDescription>),
    /// A probe found nothing at this URL
    Absent,
}

#[derive(Default)]
pub(crate) struct SynthesisCache {
    slots: Mutex<HashMap<String, Slot>>,
    fetched: Condvar,
    built: RwLock<HashMap<String, Registered>>,
}

/// Clears a `Fetching` slot if the fetcher unwinds
struct FetchGuard<'a> {
    cache: &'a SynthesisCache,
    url: &'a str,
    armed: bool,
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.cache.slots.lock().remove(self.url);
            self.cache.fetched.notify_all();
        }
    }
}

impl SynthesisCache {
    pub(crate) fn built(&self, url: &str) -> Option<Registered> {
        self.built.read().get(url).cloned()
    }

    pub(crate) fn record_built(&self, url: String, registered: Registered) {
        self.built.write().insert(url, registered);
    }

    /// Fetch `url` at most once at a time.
    ///
    /// Concurrent callers block until the running fetch returns and then
    /// share its result. A thread that asks for a URL it is itself fetching
    /// gets [`ReflectError::ReentrantFetch`]. Absent types and failures are
    /// not remembered.
    pub(crate) fn fetch<F>(&self, url: &str, fetch: F) -> Result<Option<Arc<FlatDescription>>>
    where
        F: FnOnce() -> anyhow::Result<Option<FlatDescription>>,
    {
        let me = thread::current().id();
        let mut slots = self.slots.lock();
        loop {
            let in_flight = match slots.get(url) {
                Some(Slot::Fetched(flat)) => {
                    trace!(url, "flat description cached");
                    return Ok(Some(flat.clone()));
                }
                Some(Slot::Fetching(owner)) if *owner == me => {
                    return Err(ReflectError::ReentrantFetch(url.to_string()));
                }
                Some(Slot::Fetching(_)) => true,
                Some(Slot::Absent) | None => false,
            };
            if !in_flight {
                break;
            }
            self.fetched.wait(&mut slots);
        }
        slots.insert(url.to_string(), Slot::Fetching(me));
        drop(slots);

        let mut guard = FetchGuard {
            cache: self,
            url,
            armed: true,
        };
        debug!(url, "fetching type");
        let result = fetch();
        guard.armed = false;

        let mut slots = self.slots.lock();
        let outcome = match result {
            Ok(Some(flat)) => {
                debug!(url, name = flat.name(), "fetched type");
                let flat = Arc::new(flat);
                slots.insert(url.to_string(), Slot::Fetched(flat.clone()));
                Ok(Some(flat))
            }
            Ok(None) => {
                debug!(url, "fetcher has no such type");
                slots.remove(url);
                Ok(None)
            }
            Err(source) => {
                slots.remove(url);
                Err(ReflectError::Fetch {
                    url: url.to_string(),
                    source,
                })
            }
        };
        drop(slots);
        self.fetched.notify_all();
        outcome
    }

    /// Speculative fetch of a URL that may not name a type at all.
    ///
    /// Shares slots with [`fetch`](Self::fetch), but a failure counts as
    /// absence, absence is remembered, and a thread already fetching `url`
    /// gets `None`.
    pub(crate) fn probe<F>(&self, url: &str, fetch: F) -> Option<Arc<FlatDescription>>
    where
        F: FnOnce() -> anyhow::Result<Option<FlatDescription>>,
    {
        let me = thread::current().id();
        let mut slots = self.slots.lock();
        loop {
            match slots.get(url) {
                Some(Slot::Fetched(flat)) => return Some(flat.clone()),
                Some(Slot::Absent) => return None,
                Some(Slot::Fetching(owner)) if *owner == me => return None,
                Some(Slot::Fetching(_)) => self.fetched.wait(&mut slots),
                None => break,
            }
        }
        slots.insert(url.to_string(), Slot::Fetching(me));
        drop(slots);

        let mut guard = FetchGuard {
            cache: self,
            url,
            armed: true,
        };
        trace!(url, "probing");
        let result = fetch();
        guard.armed = false;

        let mut slots = self.slots.lock();
        let found = match result {
            Ok(Some(flat)) => {
                let flat = Arc::new(flat);
                slots.insert(url.to_string(), Slot::Fetched(flat.clone()));
                Some(flat)
            }
            Ok(None) => {
                slots.insert(url.to_string(), Slot::Absent);
                None
            }
            Err(err) => {
                debug!(url, error = %err, "probe failed, treating as absent");
                slots.insert(url.to_string(), Slot::Absent);
                None
            }
        };
        drop(slots);
        self.fetched.notify_all();
        found
    }
}
