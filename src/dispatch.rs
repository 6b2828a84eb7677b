use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use slotmap::{SlotMap, new_key_type};
use toml::Value;

use crate::schedule::{ScheduledAction, Scheduler, TaskKey};

new_key_type! {
    /// Subscription handle returned by `on`, consumed by `off`.
    pub struct HandlerId;
}

pub type Handler = Box<dyn FnMut(Option<&Value>) -> anyhow::Result<()>>;

struct Subscription {
    id: HandlerId,
    priority: i32,
    handler: Handler,
}

/// One executed emission, kept in the diagnostic history ring.
#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    pub seq: u64,
    pub signal: String,
    pub payload: Option<Value>,
}

struct PendingEmit {
    task: TaskKey,
    payload: Option<Value>,
}

/// Priority-ordered publish/subscribe for editor signals, with optional
/// per-signal trailing-edge debounce. Handler failures are logged and
/// contained; an emitter never sees them.
pub struct EventDispatch {
    handlers: HashMap<String, Vec<Subscription>>,
    ids: SlotMap<HandlerId, ()>,
    debounce: HashMap<String, Duration>,
    pending: HashMap<String, PendingEmit>,
    history: VecDeque<Emission>,
    history_cap: usize,
    seq: u64,
}

impl EventDispatch {
    pub fn new(history_cap: usize) -> Self {
        Self {
            handlers: HashMap::new(),
            ids: SlotMap::with_key(),
            debounce: HashMap::new(),
            pending: HashMap::new(),
            history: VecDeque::new(),
            history_cap: history_cap.max(1),
            seq: 0,
        }
    }

    /// Subscribe to a signal. Higher priority runs earlier; equal
    /// priorities keep subscription order.
    pub fn on(
        &mut self,
        signal: &str,
        priority: i32,
        handler: impl FnMut(Option<&Value>) -> anyhow::Result<()> + 'static,
    ) -> HandlerId {
        let id = self.ids.insert(());
        let subs = self.handlers.entry(signal.to_string()).or_default();
        let at = subs.partition_point(|sub| sub.priority >= priority);
        subs.insert(
            at,
            Subscription {
                id,
                priority,
                handler: Box::new(handler),
            },
        );
        id
    }

    /// Remove a subscription by identity. False if it was already gone.
    pub fn off(&mut self, signal: &str, id: HandlerId) -> bool {
        self.ids.remove(id);
        let Some(subs) = self.handlers.get_mut(signal) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|sub| sub.id != id);
        before != subs.len()
    }

    /// Debounce a signal: emissions collapse to the trailing edge of the
    /// window, delivering only the last payload.
    pub fn set_debounce(&mut self, signal: &str, window: Duration) {
        self.debounce.insert(signal.to_string(), window);
    }

    pub fn handler_count(&self, signal: &str) -> usize {
        self.handlers.get(signal).map_or(0, Vec::len)
    }

    /// Emit a signal. Debounced signals cancel-and-replace any pending
    /// flush; everything else delivers synchronously.
    pub fn emit(
        &mut self,
        signal: &str,
        payload: Option<Value>,
        now: Instant,
        scheduler: &mut Scheduler,
    ) {
        if let Some(window) = self.debounce.get(signal).copied() {
            if let Some(prior) = self.pending.remove(signal) {
                scheduler.cancel(prior.task);
            }
            let task = scheduler.schedule_after(
                now,
                window,
                ScheduledAction::FlushSignal {
                    signal: signal.to_string(),
                },
            );
            self.pending.insert(signal.to_string(), PendingEmit { task, payload });
            return;
        }
        self.deliver(signal, payload);
    }

    /// Deliver the pending debounced payload. Driven by the owner when
    /// the scheduler hands back a `FlushSignal` action.
    pub fn flush(&mut self, signal: &str) {
        if let Some(pending) = self.pending.remove(signal) {
            self.deliver(signal, pending.payload);
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &Emission> {
        self.history.iter()
    }

    fn deliver(&mut self, signal: &str, payload: Option<Value>) {
        self.seq += 1;
        self.history.push_back(Emission {
            seq: self.seq,
            signal: signal.to_string(),
            payload: payload.clone(),
        });
        while self.history.len() > self.history_cap {
            self.history.pop_front();
        }

        let Some(subs) = self.handlers.get_mut(signal) else {
            return;
        };
        for sub in subs.iter_mut() {
            if let Err(err) = (sub.handler)(payload.as_ref()) {
                tracing::warn!("handler for {signal} failed: {err:#}");
            }
        }
    }
}
