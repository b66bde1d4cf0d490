pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod history;
pub mod logging;
pub mod models;
pub mod notify;
pub mod scheduler;
pub mod state;
pub mod storage;

pub use error::TodoError;
pub use events::ChangeEvent;
pub use history::HistoryLog;
pub use models::{DayKey, Rgba, Task, TaskChanges};
pub use state::{Placement, TaskRegistry};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
