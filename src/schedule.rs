use std::time::{Duration, Instant};

use slotmap::{SlotMap, new_key_type};

new_key_type! {
    /// Stable handle for a pending task, used for cancellation.
    pub struct TaskKey;
}

/// What to do when a task comes due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduledAction {
    /// Deliver the pending debounced emission for a signal.
    FlushSignal { signal: String },
    /// Force-load a lazy plugin whose trigger never fired.
    LazyTimeout { plugin: String },
}

#[derive(Debug)]
struct Task {
    due: Instant,
    action: ScheduledAction,
}

/// Cooperative timer queue. Tasks are plain data; nothing runs until the
/// owner drains them with `take_due`.
#[derive(Debug, Default)]
pub struct Scheduler {
    tasks: SlotMap<TaskKey, Task>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_at(&mut self, due: Instant, action: ScheduledAction) -> TaskKey {
        self.tasks.insert(Task { due, action })
    }

    pub fn schedule_after(
        &mut self,
        now: Instant,
        delay: Duration,
        action: ScheduledAction,
    ) -> TaskKey {
        self.schedule_at(now + delay, action)
    }

    /// Cancel a pending task. False if it already fired or was cancelled.
    pub fn cancel(&mut self, key: TaskKey) -> bool {
        self.tasks.remove(key).is_some()
    }

    pub fn is_pending(&self, key: TaskKey) -> bool {
        self.tasks.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Earliest pending deadline. Lets the embedding loop pick its sleep.
    pub fn next_due(&self) -> Option<Instant> {
        self.tasks.values().map(|task| task.due).min()
    }

    /// Remove and return every task due at `now`, earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<ScheduledAction> {
        let mut due: Vec<(TaskKey, Instant)> = self
            .tasks
            .iter()
            .filter(|(_, task)| now >= task.due)
            .map(|(key, task)| (key, task.due))
            .collect();
        due.sort_by_key(|(_, at)| *at);

        due.into_iter()
            .filter_map(|(key, _)| self.tasks.remove(key).map(|task| task.action))
            .collect()
    }
}
