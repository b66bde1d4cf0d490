use tokio::sync::broadcast;

use crate::error::TodoError;
use crate::events::ChangeEvent;
use crate::models::Task;
use crate::state::TaskRegistry;

/// The completed/failed task log shown on the history page.
///
/// Reads and writes go through the registry, so the calendar and the history
/// page always see the same archive and it has a single writer.
#[derive(Clone)]
pub struct HistoryLog {
    registry: TaskRegistry,
}

impl HistoryLog {
    pub fn new(registry: TaskRegistry) -> Self {
        Self { registry }
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.registry.archived_tasks()
    }

    pub fn len(&self) -> usize {
        self.tasks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends, persists and notifies.
    pub async fn add_completed_task(&self, task: Task) -> Result<(), TodoError> {
        self.registry.append_archived(task).await
    }

    /// Re-reads the archive from storage.
    pub async fn reload(&self) -> Result<(), TodoError> {
        self.registry.reload_archive().await
    }

    /// Change stream of the underlying registry; filter with
    /// [`ChangeEvent::touches_archive`] to rebuild only on archive changes.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.registry.subscribe()
    }
}
