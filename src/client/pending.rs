use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde_json::Value;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::event::lock_ignore_poison;
use crate::{RequestId, Result, SchemaPtr};

/// Bookkeeping for one outstanding call.
///
/// Consumed exactly once, by [`PendingCall::resolve`].
pub(super) struct PendingCall {
    // ---
    pub(super) method: Arc<str>,
    pub(super) result_schema: SchemaPtr,
    pub(super) created_at: Instant,
    tx: oneshot::Sender<Result<Value>>,
    timer: Option<JoinHandle<()>>,
}

impl PendingCall {
    // ---
    pub(super) fn new(
        method: Arc<str>,
        result_schema: SchemaPtr,
        tx: oneshot::Sender<Result<Value>>,
    ) -> Self {
        Self {
            method,
            result_schema,
            created_at: Instant::now(),
            tx,
            timer: None,
        }
    }

    /// Cancel the timer and hand the outcome to the caller.
    pub(super) fn resolve(self, outcome: Result<Value>) {
        if let Some(timer) = self.timer {
            timer.abort();
        }
        // The caller may have gone away; nothing to do then.
        let _ = self.tx.send(outcome);
    }

    /// Drop the call without an outcome; the caller reports its own error.
    pub(super) fn cancel(self) {
        if let Some(timer) = self.timer {
            timer.abort();
        }
    }
}

/// Outstanding calls keyed by request id.
///
/// Every removal goes through [`claim`](Self::claim) or
/// [`drain`](Self::drain), so whichever of response, timeout or shutdown
/// gets there first owns the call and the others find nothing. The number
/// of entries is published on a watch channel after every change.
pub(super) struct PendingCalls {
    // ---
    calls: Mutex<HashMap<RequestId, PendingCall>>,
    count: watch::Sender<usize>,
}

impl PendingCalls {
    // ---
    pub(super) fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self {
            calls: Mutex::new(HashMap::new()),
            count,
        }
    }

    /// Register a call. Returns false, leaving the table untouched, if the
    /// id is already pending.
    pub(super) fn insert(&self, id: RequestId, call: PendingCall) -> bool {
        // ---
        let mut calls = lock_ignore_poison(&self.calls);
        if calls.contains_key(&id) {
            return false;
        }
        calls.insert(id, call);
        self.count.send_replace(calls.len());
        true
    }

    /// Attach the timeout task to a call, or abort it if the call is
    /// already gone.
    pub(super) fn attach_timer(&self, id: &RequestId, timer: JoinHandle<()>) {
        // ---
        let mut calls = lock_ignore_poison(&self.calls);
        match calls.get_mut(id) {
            Some(call) => call.timer = Some(timer),
            None => timer.abort(),
        }
    }

    /// Remove and return the call for `id`, if still pending.
    pub(super) fn claim(&self, id: &RequestId) -> Option<PendingCall> {
        // ---
        let mut calls = lock_ignore_poison(&self.calls);
        let call = calls.remove(id);
        if call.is_some() {
            self.count.send_replace(calls.len());
        }
        call
    }

    /// Remove every pending call.
    pub(super) fn drain(&self) -> Vec<(RequestId, PendingCall)> {
        // ---
        let mut calls = lock_ignore_poison(&self.calls);
        let drained: Vec<_> = calls.drain().collect();
        self.count.send_replace(0);
        drained
    }

    pub(super) fn len(&self) -> usize {
        lock_ignore_poison(&self.calls).len()
    }

    /// Watch the number of pending calls.
    pub(super) fn watch(&self) -> watch::Receiver<usize> {
        self.count.subscribe()
    }
}
