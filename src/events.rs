use tokio::sync::broadcast;

use crate::models::DayKey;

pub const EVENT_TASKS_LOADED: &str = "tasks_loaded";
pub const EVENT_TASK_SCHEDULED: &str = "task_scheduled";
pub const EVENT_TASK_FAILED: &str = "task_failed";
pub const EVENT_TASK_EDITED: &str = "task_edited";
pub const EVENT_TASK_DELETED: &str = "task_deleted";
pub const EVENT_TASK_COMPLETED: &str = "task_completed";
pub const EVENT_TASK_ARCHIVED: &str = "task_archived";
pub const EVENT_ARCHIVE_RELOADED: &str = "archive_reloaded";

const CHANNEL_CAPACITY: usize = 64;

/// Emitted after every registry mutation has been applied in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Loaded,
    TaskScheduled { day: DayKey },
    /// A task added or edited with a time in the past went straight to the archive.
    TaskFailed { day: DayKey },
    TaskEdited { day: DayKey },
    TaskDeleted { day: DayKey },
    TaskCompleted { day: DayKey },
    TaskArchived,
    ArchiveReloaded,
}

impl ChangeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ChangeEvent::Loaded => EVENT_TASKS_LOADED,
            ChangeEvent::TaskScheduled { .. } => EVENT_TASK_SCHEDULED,
            ChangeEvent::TaskFailed { .. } => EVENT_TASK_FAILED,
            ChangeEvent::TaskEdited { .. } => EVENT_TASK_EDITED,
            ChangeEvent::TaskDeleted { .. } => EVENT_TASK_DELETED,
            ChangeEvent::TaskCompleted { .. } => EVENT_TASK_COMPLETED,
            ChangeEvent::TaskArchived => EVENT_TASK_ARCHIVED,
            ChangeEvent::ArchiveReloaded => EVENT_ARCHIVE_RELOADED,
        }
    }

    pub fn day(&self) -> Option<DayKey> {
        match self {
            ChangeEvent::TaskScheduled { day }
            | ChangeEvent::TaskFailed { day }
            | ChangeEvent::TaskEdited { day }
            | ChangeEvent::TaskDeleted { day }
            | ChangeEvent::TaskCompleted { day } => Some(*day),
            ChangeEvent::Loaded | ChangeEvent::TaskArchived | ChangeEvent::ArchiveReloaded => None,
        }
    }

    /// True when the archive list changed.
    pub fn touches_archive(&self) -> bool {
        matches!(
            self,
            ChangeEvent::Loaded
                | ChangeEvent::TaskFailed { .. }
                | ChangeEvent::TaskCompleted { .. }
                | ChangeEvent::TaskArchived
                | ChangeEvent::ArchiveReloaded
        )
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ChangeEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ChangeEvent) {
        log::debug!("emit event={} day={:?}", event.name(), event.day());
        // Nobody listening is fine.
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
