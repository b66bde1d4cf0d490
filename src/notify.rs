use async_trait::async_trait;
use chrono::{DateTime, Local, SecondsFormat};
use serde::{Deserialize, Serialize};

use crate::error::TodoError;
use crate::models::Task;

const REMINDER_TITLE: &str = "Task reminder";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChannelConfig {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            id: "task_reminders".to_string(),
            name: "Task reminders".to_string(),
            description: "Fires once when a scheduled task is due".to_string(),
        }
    }
}

/// A fire-once local alert.
#[derive(Debug, Clone, PartialEq)]
pub struct Reminder {
    pub id: u32,
    pub title: String,
    pub body: String,
    pub trigger_at: DateTime<Local>,
    pub channel: ChannelConfig,
}

impl Reminder {
    pub fn for_task(task: &Task, channel: &ChannelConfig) -> Self {
        Self {
            id: reminder_id(task),
            title: REMINDER_TITLE.to_string(),
            body: task.text().to_string(),
            trigger_at: task.time(),
            channel: channel.clone(),
        }
    }
}

/// Stable id derived from the task's text and time (32-bit FNV-1a).
///
/// Kept within the positive `i32` range that mobile notification APIs accept.
pub fn reminder_id(task: &Task) -> u32 {
    const OFFSET_BASIS: u32 = 0x811C_9DC5;
    const PRIME: u32 = 0x0100_0193;

    let time = task
        .time()
        .to_rfc3339_opts(SecondsFormat::AutoSi, true);
    let mut hash = OFFSET_BASIS;
    for byte in task
        .text()
        .as_bytes()
        .iter()
        .chain(std::iter::once(&0u8))
        .chain(time.as_bytes())
    {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash & 0x7FFF_FFFF
}

pub trait NotificationScheduler: Send + Sync {
    fn schedule(&self, reminder: Reminder) -> Result<(), TodoError>;

    fn cancel(&self, id: u32) -> Result<(), TodoError> {
        let _ = id;
        Ok(())
    }
}

pub struct NoopScheduler;

impl NotificationScheduler for NoopScheduler {
    fn schedule(&self, _reminder: Reminder) -> Result<(), TodoError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    PermanentlyDenied,
}

#[async_trait]
pub trait PermissionPrompt: Send + Sync {
    async fn request(&self) -> PermissionStatus;

    /// Sends the user to the system settings page of the app.
    async fn open_settings(&self) {}
}

/// Answers every request with the same status.
pub struct StaticPermission(pub PermissionStatus);

#[async_trait]
impl PermissionPrompt for StaticPermission {
    async fn request(&self) -> PermissionStatus {
        self.0
    }
}

pub async fn request_notification_permission(
    prompt: &dyn PermissionPrompt,
) -> Result<(), TodoError> {
    match prompt.request().await {
        PermissionStatus::Granted => {
            log::info!("notification permission granted");
            Ok(())
        }
        PermissionStatus::Denied => {
            log::warn!("notification permission denied");
            Err(TodoError::permission_denied("notifications were refused"))
        }
        PermissionStatus::PermanentlyDenied => {
            log::warn!("notification permission permanently denied, opening settings");
            prompt.open_settings().await;
            Err(TodoError::permission_denied(
                "notifications are disabled in system settings",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Rgba;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make_task(text: &str, hour: u32) -> Task {
        let time = Local
            .with_ymd_and_hms(2024, 6, 1, hour, 0, 0)
            .single()
            .unwrap();
        Task::new(text, Rgba::opaque(0x21, 0x96, 0xF3), time)
    }

    #[test]
    fn reminder_id_is_stable_and_ignores_color_and_completion() {
        let task = make_task("Buy milk", 9);
        let id = reminder_id(&task);
        assert_eq!(id, reminder_id(&make_task("Buy milk", 9)));
        assert_eq!(id, reminder_id(&task.completed()));
        assert!(id <= i32::MAX as u32);

        assert_ne!(id, reminder_id(&make_task("Buy milk", 10)));
        assert_ne!(id, reminder_id(&make_task("Buy bread", 9)));
    }

    #[test]
    fn reminder_for_task_copies_text_and_time() {
        let task = make_task("Buy milk", 9);
        let channel = ChannelConfig::default();
        let reminder = Reminder::for_task(&task, &channel);
        assert_eq!(reminder.id, reminder_id(&task));
        assert_eq!(reminder.title, "Task reminder");
        assert_eq!(reminder.body, "Buy milk");
        assert_eq!(reminder.trigger_at, task.time());
        assert_eq!(reminder.channel.id, "task_reminders");
    }

    struct CountingPrompt {
        status: PermissionStatus,
        settings_opened: AtomicUsize,
    }

    #[async_trait]
    impl PermissionPrompt for CountingPrompt {
        async fn request(&self) -> PermissionStatus {
            self.status
        }

        async fn open_settings(&self) {
            self.settings_opened.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn permission_outcomes() {
        assert!(request_notification_permission(&StaticPermission(PermissionStatus::Granted))
            .await
            .is_ok());

        let denied = CountingPrompt {
            status: PermissionStatus::Denied,
            settings_opened: AtomicUsize::new(0),
        };
        let err = request_notification_permission(&denied).await.unwrap_err();
        assert_eq!(err.code(), "permission_denied");
        assert_eq!(denied.settings_opened.load(Ordering::SeqCst), 0);

        let blocked = CountingPrompt {
            status: PermissionStatus::PermanentlyDenied,
            settings_opened: AtomicUsize::new(0),
        };
        assert!(request_notification_permission(&blocked).await.is_err());
        assert_eq!(blocked.settings_opened.load(Ordering::SeqCst), 1);
    }
}
