use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;

use crate::clock::{Clock, SystemClock};
use crate::config::Settings;
use crate::error::TodoError;
use crate::events::{ChangeEvent, EventBus};
use crate::models::{DayKey, Rgba, Task};
use crate::notify::{reminder_id, ChannelConfig, NoopScheduler, NotificationScheduler, Reminder};
use crate::storage::{KeyValueStore, COMPLETED_TASKS_KEY, TASKS_KEY};

/// Where an added or edited task ended up.
#[derive(Debug, Clone, PartialEq)]
pub enum Placement {
    Scheduled,
    /// Its time had already passed; holds the archived copy.
    Failed(Task),
}

#[derive(Debug, Clone)]
struct ArchivePolicy {
    failure_marker: String,
    failure_color: Rgba,
    reminder_channel: ChannelConfig,
    reminders_enabled: bool,
}

impl From<&Settings> for ArchivePolicy {
    fn from(settings: &Settings) -> Self {
        Self {
            failure_marker: settings.failure_marker.clone(),
            failure_color: settings.failure_color(),
            reminder_channel: settings.reminder_channel.clone(),
            reminders_enabled: settings.notifications_enabled,
        }
    }
}

/// Owns the per-day task lists and the archive of completed and failed tasks.
///
/// Clones share the same state, store and event stream. Every mutation is
/// applied in memory, flushed to the store as two JSON blobs and then
/// announced on the event stream.
#[derive(Clone)]
pub struct TaskRegistry {
    inner: Arc<Mutex<RegistryData>>,
    store: Arc<dyn KeyValueStore>,
    scheduler: Arc<dyn NotificationScheduler>,
    clock: Arc<dyn Clock>,
    policy: Arc<ArchivePolicy>,
    events: EventBus,
    /// Held from snapshot to the last write so flushes land in mutation order.
    persist_lock: Arc<tokio::sync::Mutex<()>>,
}

#[derive(Debug, Default)]
struct RegistryData {
    tasks_by_day: HashMap<DayKey, Vec<Task>>,
    archived: Vec<Task>,
}

impl RegistryData {
    /// Removes the first entry equal to `task` and returns its index.
    fn remove_first(&mut self, day: DayKey, task: &Task) -> Option<usize> {
        let list = self.tasks_by_day.get_mut(&day)?;
        let index = list.iter().position(|candidate| candidate == task)?;
        list.remove(index);
        if list.is_empty() {
            self.tasks_by_day.remove(&day);
        }
        Some(index)
    }

    fn contains(&self, task: &Task) -> bool {
        self.tasks_by_day
            .values()
            .any(|list| list.iter().any(|candidate| candidate == task))
    }
}

impl TaskRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryData::default())),
            store,
            scheduler: Arc::new(NoopScheduler),
            clock: Arc::new(SystemClock),
            policy: Arc::new(ArchivePolicy::from(&Settings::default())),
            events: EventBus::new(),
            persist_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn with_settings(mut self, settings: &Settings) -> Self {
        self.policy = Arc::new(ArchivePolicy::from(settings));
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn NotificationScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryData> {
        self.inner.lock().expect("registry poisoned")
    }

    /// Replaces the in-memory state with the persisted blobs. Missing blobs load as empty.
    pub async fn load(&self) -> Result<(), TodoError> {
        let tasks_raw = self.store.get_string(TASKS_KEY).await?;
        let archived_raw = self.store.get_string(COMPLETED_TASKS_KEY).await?;
        let tasks_by_day = decode_tasks_by_day(tasks_raw.as_deref())
            .inspect_err(|err| log::error!("failed to load {TASKS_KEY}: {err}"))?;
        let archived = decode_archive(archived_raw.as_deref())
            .inspect_err(|err| log::error!("failed to load {COMPLETED_TASKS_KEY}: {err}"))?;

        {
            let mut guard = self.lock();
            log::info!(
                "tasks loaded days={} scheduled={} archived={}",
                tasks_by_day.len(),
                tasks_by_day.values().map(Vec::len).sum::<usize>(),
                archived.len()
            );
            guard.tasks_by_day = tasks_by_day;
            guard.archived = archived;
        }
        self.events.emit(ChangeEvent::Loaded);
        Ok(())
    }

    pub async fn add_task(
        &self,
        day: impl Into<DayKey>,
        task: Task,
    ) -> Result<Placement, TodoError> {
        let day = day.into();
        let now = self.clock.now();
        let placement = {
            let mut guard = self.lock();
            self.place(&mut guard, day, task.clone(), None, now)
        };
        log::debug!("add_task day={day} placement={}", placement_name(&placement));
        if placement == Placement::Scheduled {
            self.schedule_reminder(&task);
        }
        self.commit(placement_event(&placement, day, ChangeEvent::TaskScheduled { day }))
            .await?;
        Ok(placement)
    }

    /// Replaces `old` with `new` on `day`, keeping its position in the list.
    pub async fn edit_task(
        &self,
        day: impl Into<DayKey>,
        old: &Task,
        new: Task,
    ) -> Result<Placement, TodoError> {
        let day = day.into();
        let now = self.clock.now();
        let (removed_at, old_orphaned, placement) = {
            let mut guard = self.lock();
            let removed_at = guard.remove_first(day, old);
            let old_orphaned = removed_at.is_some() && !guard.contains(old);
            let placement = self.place(&mut guard, day, new.clone(), removed_at, now);
            (removed_at, old_orphaned, placement)
        };
        log::debug!(
            "edit_task day={day} found={} placement={}",
            removed_at.is_some(),
            placement_name(&placement)
        );
        if old_orphaned {
            self.cancel_reminder(old);
        }
        if placement == Placement::Scheduled {
            self.schedule_reminder(&new);
        }
        self.commit(placement_event(&placement, day, ChangeEvent::TaskEdited { day }))
            .await?;
        Ok(placement)
    }

    /// Returns whether an entry was removed; a missing task is not an error.
    pub async fn delete_task(&self, day: impl Into<DayKey>, task: &Task) -> Result<bool, TodoError> {
        let day = day.into();
        let (removed, orphaned) = {
            let mut guard = self.lock();
            let removed = guard.remove_first(day, task).is_some();
            (removed, removed && !guard.contains(task))
        };
        log::debug!("delete_task day={day} removed={removed}");
        if orphaned {
            self.cancel_reminder(task);
        }
        self.commit(ChangeEvent::TaskDeleted { day }).await?;
        Ok(removed)
    }

    /// Moves `task` to the archive as completed and returns the archived copy.
    pub async fn mark_completed(
        &self,
        day: impl Into<DayKey>,
        task: &Task,
    ) -> Result<Task, TodoError> {
        let day = day.into();
        let completed = task.completed();
        let (removed, orphaned) = {
            let mut guard = self.lock();
            let removed = guard.remove_first(day, task).is_some();
            guard.archived.push(completed.clone());
            (removed, removed && !guard.contains(task))
        };
        log::debug!("mark_completed day={day} removed={removed}");
        if orphaned {
            self.cancel_reminder(task);
        }
        self.commit(ChangeEvent::TaskCompleted { day }).await?;
        Ok(completed)
    }

    pub fn tasks_for_day(&self, day: impl Into<DayKey>) -> Vec<Task> {
        let day: DayKey = day.into();
        self.lock()
            .tasks_by_day
            .get(&day)
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot of the archive, oldest first.
    pub fn archived_tasks(&self) -> Vec<Task> {
        self.lock().archived.clone()
    }

    pub fn days_with_tasks(&self) -> Vec<DayKey> {
        let mut days: Vec<DayKey> = self.lock().tasks_by_day.keys().copied().collect();
        days.sort();
        days
    }

    /// All scheduled tasks ordered by day, then by list position.
    pub fn scheduled_tasks(&self) -> Vec<(DayKey, Task)> {
        let guard = self.lock();
        let mut days: Vec<&DayKey> = guard.tasks_by_day.keys().collect();
        days.sort();
        let tasks = days
            .into_iter()
            .flat_map(|day| {
                guard.tasks_by_day[day]
                    .iter()
                    .map(move |task| (*day, task.clone()))
            })
            .collect();
        tasks
    }

    /// Schedules reminders for every scheduled task that is not yet due, e.g. after a load.
    pub fn reschedule_reminders(&self) -> usize {
        let now = self.clock.now();
        let upcoming: Vec<Task> = self
            .scheduled_tasks()
            .into_iter()
            .map(|(_, task)| task)
            .filter(|task| !task.is_past(now))
            .collect();
        upcoming
            .iter()
            .filter(|task| self.schedule_reminder(task))
            .count()
    }

    /// Appends an already archived task, e.g. one completed outside the calendar.
    pub async fn append_archived(&self, task: Task) -> Result<(), TodoError> {
        self.lock().archived.push(task);
        self.commit(ChangeEvent::TaskArchived).await
    }

    /// Re-reads only the archive blob, leaving the per-day lists alone.
    pub async fn reload_archive(&self) -> Result<(), TodoError> {
        let raw = self.store.get_string(COMPLETED_TASKS_KEY).await?;
        let archived = decode_archive(raw.as_deref())
            .inspect_err(|err| log::error!("failed to reload {COMPLETED_TASKS_KEY}: {err}"))?;
        self.lock().archived = archived;
        self.events.emit(ChangeEvent::ArchiveReloaded);
        Ok(())
    }

    /// Writes both blobs to the store. Concurrent calls are serialized, so the
    /// last write always carries the newest state.
    pub async fn persist(&self) -> Result<(), TodoError> {
        let _flushing = self.persist_lock.lock().await;
        let (tasks_json, archived_json) = {
            let guard = self.lock();
            encode(&guard)?
        };
        self.store.set_string(TASKS_KEY, &tasks_json).await?;
        self.store
            .set_string(COMPLETED_TASKS_KEY, &archived_json)
            .await?;
        Ok(())
    }

    /// Flushes, then announces the change even when the flush failed.
    async fn commit(&self, event: ChangeEvent) -> Result<(), TodoError> {
        let flushed = self.persist().await;
        if let Err(err) = &flushed {
            log::warn!("persist failed after {}: {err}", event.name());
        }
        self.events.emit(event);
        flushed
    }

    fn place(
        &self,
        data: &mut RegistryData,
        day: DayKey,
        task: Task,
        index: Option<usize>,
        now: chrono::DateTime<chrono::Local>,
    ) -> Placement {
        if task.is_past(now) {
            let failed = task.failed(&self.policy.failure_marker, self.policy.failure_color);
            data.archived.push(failed.clone());
            return Placement::Failed(failed);
        }
        let list = data.tasks_by_day.entry(day).or_default();
        match index {
            Some(index) if index <= list.len() => list.insert(index, task),
            _ => list.push(task),
        }
        Placement::Scheduled
    }

    fn schedule_reminder(&self, task: &Task) -> bool {
        if !self.policy.reminders_enabled {
            return false;
        }
        let reminder = Reminder::for_task(task, &self.policy.reminder_channel);
        let id = reminder.id;
        match self.scheduler.schedule(reminder) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("failed to schedule reminder id={id}: {err}");
                false
            }
        }
    }

    fn cancel_reminder(&self, task: &Task) {
        if !self.policy.reminders_enabled {
            return;
        }
        let id = reminder_id(task);
        if let Err(err) = self.scheduler.cancel(id) {
            log::warn!("failed to cancel reminder id={id}: {err}");
        }
    }
}

fn placement_name(placement: &Placement) -> &'static str {
    match placement {
        Placement::Scheduled => "scheduled",
        Placement::Failed(_) => "failed",
    }
}

fn placement_event(placement: &Placement, day: DayKey, scheduled: ChangeEvent) -> ChangeEvent {
    match placement {
        Placement::Scheduled => scheduled,
        Placement::Failed(_) => ChangeEvent::TaskFailed { day },
    }
}

fn encode(data: &RegistryData) -> Result<(String, String), TodoError> {
    let by_day: BTreeMap<String, &Vec<Task>> = data
        .tasks_by_day
        .iter()
        .map(|(day, tasks)| (day.to_string(), tasks))
        .collect();
    Ok((
        serde_json::to_string(&by_day)?,
        serde_json::to_string(&data.archived)?,
    ))
}

/// Keys carrying a time of day are folded onto their date; lists that land on
/// the same day are concatenated in key order.
fn decode_tasks_by_day(raw: Option<&str>) -> Result<HashMap<DayKey, Vec<Task>>, TodoError> {
    let Some(raw) = raw else {
        return Ok(HashMap::new());
    };
    let stored: BTreeMap<String, Vec<Task>> = serde_json::from_str(raw)
        .map_err(|err| TodoError::format(format!("invalid {TASKS_KEY} blob: {err}")))?;
    let mut tasks_by_day: HashMap<DayKey, Vec<Task>> = HashMap::new();
    for (key, tasks) in stored {
        if tasks.is_empty() {
            continue;
        }
        let day = DayKey::parse(&key)?;
        tasks_by_day.entry(day).or_default().extend(tasks);
    }
    Ok(tasks_by_day)
}

fn decode_archive(raw: Option<&str>) -> Result<Vec<Task>, TodoError> {
    match raw {
        None => Ok(Vec::new()),
        Some(raw) => serde_json::from_str(raw).map_err(|err| {
            TodoError::format(format!("invalid {COMPLETED_TASKS_KEY} blob: {err}"))
        }),
    }
}
