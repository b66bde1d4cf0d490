use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::error::TodoError;
use crate::notify::{NotificationScheduler, Reminder};

const TICK: Duration = Duration::from_secs(1);

/// Receives reminders as they come due.
pub trait ReminderSink: Send + Sync {
    fn deliver(&self, reminder: &Reminder);
}

impl<F> ReminderSink for F
where
    F: Fn(&Reminder) + Send + Sync,
{
    fn deliver(&self, reminder: &Reminder) {
        self(reminder)
    }
}

/// In-process reminder scheduler for hosts without a platform notification service.
///
/// Pending reminders are checked once per second; each fires at most once.
#[derive(Clone)]
pub struct IntervalScheduler {
    pending: Arc<Mutex<Vec<Reminder>>>,
    clock: Arc<dyn Clock>,
}

impl IntervalScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            pending: Arc::new(Mutex::new(Vec::new())),
            clock,
        }
    }

    pub fn pending(&self) -> Vec<Reminder> {
        self.pending.lock().expect("scheduler poisoned").clone()
    }

    /// Removes and returns reminders due at `now`, earliest first.
    pub fn take_due(&self, now: DateTime<Local>) -> Vec<Reminder> {
        let mut guard = self.pending.lock().expect("scheduler poisoned");
        let (mut due, waiting): (Vec<Reminder>, Vec<Reminder>) = guard
            .drain(..)
            .partition(|reminder| reminder.trigger_at <= now);
        *guard = waiting;
        due.sort_by_key(|reminder| reminder.trigger_at);
        due
    }

    pub fn start(&self, sink: Arc<dyn ReminderSink>) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let now = scheduler.clock.now();
                for reminder in scheduler.take_due(now) {
                    log::info!("reminder fired id={} at={}", reminder.id, reminder.trigger_at);
                    sink.deliver(&reminder);
                }
            }
        })
    }
}

impl NotificationScheduler for IntervalScheduler {
    fn schedule(&self, reminder: Reminder) -> Result<(), TodoError> {
        let mut guard = self.pending.lock().expect("scheduler poisoned");
        guard.retain(|existing| existing.id != reminder.id);
        log::debug!("reminder scheduled id={} at={}", reminder.id, reminder.trigger_at);
        guard.push(reminder);
        Ok(())
    }

    fn cancel(&self, id: u32) -> Result<(), TodoError> {
        self.pending
            .lock()
            .expect("scheduler poisoned")
            .retain(|existing| existing.id != id);
        Ok(())
    }
}
