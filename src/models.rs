use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::TodoError;

/// Color tag of a task, one byte per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 0xFF)
    }

    /// Packs the color as `0xAARRGGBB`, the integer layout of the persisted records.
    pub fn to_packed(self) -> u32 {
        (u32::from(self.a) << 24)
            | (u32::from(self.r) << 16)
            | (u32::from(self.g) << 8)
            | u32::from(self.b)
    }

    pub fn from_packed(value: u32) -> Self {
        Self {
            a: (value >> 24) as u8,
            r: (value >> 16) as u8,
            g: (value >> 8) as u8,
            b: value as u8,
        }
    }

    /// Parses `#RRGGBB` or `#AARRGGBB`.
    pub fn from_hex(raw: &str) -> Result<Self, TodoError> {
        let invalid = || TodoError::format(format!("invalid color {raw:?}"));
        let digits = raw.trim().trim_start_matches('#');
        if !matches!(digits.len(), 6 | 8) || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let value = u32::from_str_radix(digits, 16).map_err(|_| invalid())?;
        if digits.len() == 6 {
            Ok(Self::from_packed(0xFF00_0000 | value))
        } else {
            Ok(Self::from_packed(value))
        }
    }

    pub fn to_hex(self) -> String {
        if self.a == 0xFF {
            format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
        } else {
            format!("#{:08X}", self.to_packed())
        }
    }
}

/// Date-only key of the per-day task lists.
///
/// Every conversion drops the time of day, so a selected day built at midnight
/// and one built at 14:30 land on the same list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DayKey(NaiveDate);

impl DayKey {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Accepts `YYYY-MM-DD` and ISO-8601 date-times; only the date part is kept.
    pub fn parse(raw: &str) -> Result<Self, TodoError> {
        let raw = raw.trim();
        let invalid = || TodoError::format(format!("invalid day key {raw:?}"));
        let (date_part, rest) = match raw.get(..10) {
            Some(date_part) => (date_part, &raw[10..]),
            None => return Err(invalid()),
        };
        if !(rest.is_empty() || rest.starts_with('T') || rest.starts_with(' ')) {
            return Err(invalid());
        }
        NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
            .map(Self)
            .map_err(|_| invalid())
    }
}

impl std::fmt::Display for DayKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl From<NaiveDate> for DayKey {
    fn from(value: NaiveDate) -> Self {
        Self(value)
    }
}

impl From<NaiveDateTime> for DayKey {
    fn from(value: NaiveDateTime) -> Self {
        Self(value.date())
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for DayKey {
    fn from(value: DateTime<Tz>) -> Self {
        Self(value.date_naive())
    }
}

impl<Tz: TimeZone> From<&DateTime<Tz>> for DayKey {
    fn from(value: &DateTime<Tz>) -> Self {
        Self(value.date_naive())
    }
}

/// Persisted shape of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub text: String,
    pub color: u32,
    pub time: String,
    pub is_completed: bool,
}

/// Field overrides for [`Task::with_changes`]; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct TaskChanges {
    pub text: Option<String>,
    pub color: Option<Rgba>,
    pub time: Option<DateTime<Local>>,
    pub is_completed: Option<bool>,
}

/// One to-do entry. Two tasks are equal when all four fields are equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "TaskRecord", try_from = "TaskRecord")]
pub struct Task {
    text: String,
    color: Rgba,
    time: DateTime<Local>,
    is_completed: bool,
}

impl Task {
    pub fn new(text: impl Into<String>, color: Rgba, time: DateTime<Local>) -> Self {
        Self {
            text: text.into(),
            color,
            time,
            is_completed: false,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn color(&self) -> Rgba {
        self.color
    }

    pub fn time(&self) -> DateTime<Local> {
        self.time
    }

    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    pub fn with_changes(&self, changes: TaskChanges) -> Self {
        Self {
            text: changes.text.unwrap_or_else(|| self.text.clone()),
            color: changes.color.unwrap_or(self.color),
            time: changes.time.unwrap_or(self.time),
            is_completed: changes.is_completed.unwrap_or(self.is_completed),
        }
    }

    pub fn completed(&self) -> Self {
        self.with_changes(TaskChanges {
            is_completed: Some(true),
            ..TaskChanges::default()
        })
    }

    /// Archive copy of a task that was scheduled in the past.
    pub fn failed(&self, marker: &str, color: Rgba) -> Self {
        self.with_changes(TaskChanges {
            text: Some(format!("{marker}{}", self.text)),
            color: Some(color),
            ..TaskChanges::default()
        })
    }

    /// Strictly before `now`; a task due exactly now is still schedulable.
    pub fn is_past(&self, now: DateTime<Local>) -> bool {
        self.time < now
    }

    pub fn to_record(&self) -> TaskRecord {
        TaskRecord {
            text: self.text.clone(),
            color: self.color.to_packed(),
            time: self.time.to_rfc3339_opts(SecondsFormat::AutoSi, false),
            is_completed: self.is_completed,
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "text": self.text,
            "color": self.color.to_packed(),
            "time": self.time.to_rfc3339_opts(SecondsFormat::AutoSi, false),
            "isCompleted": self.is_completed,
        })
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, TodoError> {
        let record: TaskRecord = serde_json::from_value(value)
            .map_err(|err| TodoError::format(format!("invalid task record: {err}")))?;
        Task::try_from(record)
    }
}

impl From<Task> for TaskRecord {
    fn from(value: Task) -> Self {
        value.to_record()
    }
}

impl TryFrom<TaskRecord> for Task {
    type Error = TodoError;

    fn try_from(value: TaskRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            time: parse_time(&value.time)?,
            text: value.text,
            color: Rgba::from_packed(value.color),
            is_completed: value.is_completed,
        })
    }
}

/// Parses an ISO-8601 timestamp. Strings without an offset are read as local time.
pub fn parse_time(raw: &str) -> Result<DateTime<Local>, TodoError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Local));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|err| TodoError::format(format!("time {raw:?} is not ISO-8601: {err}")))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| TodoError::format(format!("time {raw:?} does not exist locally")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn at(year: i32, month: u32, day: u32, hour: u32, min: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(year, month, day, hour, min, 0)
            .single()
            .unwrap()
    }

    fn blue() -> Rgba {
        Rgba::opaque(0x21, 0x96, 0xF3)
    }

    #[test]
    fn new_task_is_not_completed_and_allows_empty_text() {
        let task = Task::new("", blue(), at(2024, 6, 1, 9, 0));
        assert_eq!(task.text(), "");
        assert!(!task.is_completed());
    }

    #[test]
    fn with_changes_overrides_only_given_fields() {
        let task = Task::new("Buy milk", blue(), at(2024, 6, 1, 9, 0));
        let later = at(2024, 6, 1, 18, 0);
        let changed = task.with_changes(TaskChanges {
            time: Some(later),
            ..TaskChanges::default()
        });

        assert_eq!(changed.text(), "Buy milk");
        assert_eq!(changed.color(), blue());
        assert_eq!(changed.time(), later);
        assert!(!changed.is_completed());
        // The source task is untouched.
        assert_eq!(task.time(), at(2024, 6, 1, 9, 0));

        assert_eq!(task.with_changes(TaskChanges::default()), task);
    }

    #[test]
    fn completed_and_failed_copies() {
        let task = Task::new("Call mom", blue(), at(2024, 6, 1, 9, 0));
        let done = task.completed();
        assert!(done.is_completed());
        assert_eq!(done.text(), "Call mom");

        let red = Rgba::opaque(0xF4, 0x43, 0x36);
        let failed = task.failed("failed task: ", red);
        assert_eq!(failed.text(), "failed task: Call mom");
        assert_eq!(failed.color(), red);
        assert_eq!(failed.time(), task.time());
        assert!(!failed.is_completed());
    }

    #[test]
    fn is_past_is_strict() {
        let now = at(2024, 6, 1, 12, 0);
        let task = Task::new("x", blue(), now);
        assert!(!task.is_past(now));
        assert!(task.is_past(now + Duration::seconds(1)));
    }

    #[test]
    fn equality_compares_all_fields() {
        let a = Task::new("x", blue(), at(2024, 6, 1, 9, 0));
        let b = Task::new("x", blue(), at(2024, 6, 1, 9, 0));
        assert_eq!(a, b);
        assert_ne!(a, b.completed());
        assert_ne!(a, b.with_changes(TaskChanges {
            color: Some(Rgba::opaque(0, 0, 0)),
            ..TaskChanges::default()
        }));
    }

    #[test]
    fn record_round_trip_is_lossless() {
        let time = at(2024, 6, 1, 9, 30) + Duration::milliseconds(250);
        let task = Task::new("Buy milk", Rgba::new(1, 2, 3, 0x80), time).completed();

        let record = task.to_record();
        assert_eq!(record.color, 0x8001_0203);
        assert!(record.is_completed);
        assert_eq!(Task::try_from(record).unwrap(), task);

        let value = task.to_value();
        assert_eq!(Task::from_value(value).unwrap(), task);
    }

    #[test]
    fn serde_uses_camel_case_record_layout() {
        let task = Task::new("Buy milk", blue(), at(2024, 6, 1, 9, 0));
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["text"], "Buy milk");
        assert_eq!(value["color"], 0xFF21_96F3u32);
        assert_eq!(value["isCompleted"], false);
        assert!(value["time"].as_str().unwrap().starts_with("2024-06-01T09:00:00"));

        let back: Task = serde_json::from_value(value).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn from_value_rejects_bad_time_and_missing_keys() {
        let bad_time = serde_json::json!({
            "text": "x",
            "color": 4278190080u32,
            "time": "tomorrow",
            "isCompleted": false
        });
        assert_eq!(Task::from_value(bad_time).unwrap_err().code(), "format_error");

        let missing = serde_json::json!({
            "text": "x",
            "color": 4278190080u32,
            "time": "2024-06-01T09:00:00Z"
        });
        assert_eq!(Task::from_value(missing).unwrap_err().code(), "format_error");
    }

    #[test]
    fn parse_time_accepts_offsetless_iso_strings_as_local() {
        let parsed = parse_time("2024-06-01T09:00:00.000").unwrap();
        assert_eq!(parsed, at(2024, 6, 1, 9, 0));

        let parsed = parse_time("2024-06-01T09:00:00").unwrap();
        assert_eq!(parsed, at(2024, 6, 1, 9, 0));

        let utc = parse_time("2024-06-01T09:00:00.000Z").unwrap();
        assert_eq!(
            utc.with_timezone(&Utc),
            Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn rgba_packing_and_hex() {
        let color = Rgba::from_packed(0xFFF4_4336);
        assert_eq!(color, Rgba::opaque(0xF4, 0x43, 0x36));
        assert_eq!(color.to_packed(), 0xFFF4_4336);

        assert_eq!(Rgba::from_hex("#F44336").unwrap(), color);
        assert_eq!(Rgba::from_hex("80F44336").unwrap().a, 0x80);
        assert_eq!(color.to_hex(), "#F44336");
        assert_eq!(Rgba::new(1, 2, 3, 4).to_hex(), "#04010203");
        assert!(Rgba::from_hex("#F443").is_err());
        assert!(Rgba::from_hex("red").is_err());
        assert!(Rgba::from_hex("+FFFFF").is_err());
        assert!(Rgba::from_hex("#+FFFFFFF").is_err());
    }

    #[test]
    fn day_key_drops_time_of_day() {
        let midnight = DayKey::from(at(2024, 6, 1, 0, 0));
        let afternoon = DayKey::from(at(2024, 6, 1, 14, 30));
        assert_eq!(midnight, afternoon);
        assert_eq!(midnight, DayKey::from_ymd(2024, 6, 1).unwrap());
        assert_eq!(midnight.to_string(), "2024-06-01");
    }

    #[test]
    fn day_key_uses_the_zone_of_the_given_datetime() {
        let tokyo = chrono_tz::Asia::Tokyo
            .with_ymd_and_hms(2024, 6, 2, 1, 0, 0)
            .single()
            .unwrap();
        // Same instant is still June 1st in UTC.
        assert_eq!(DayKey::from(&tokyo), DayKey::from_ymd(2024, 6, 2).unwrap());
        assert_eq!(
            DayKey::from(tokyo.with_timezone(&Utc)),
            DayKey::from_ymd(2024, 6, 1).unwrap()
        );
    }

    #[test]
    fn day_key_parse_accepts_dates_and_datetimes() {
        let expected = DayKey::from_ymd(2024, 6, 1).unwrap();
        assert_eq!(DayKey::parse("2024-06-01").unwrap(), expected);
        assert_eq!(DayKey::parse("2024-06-01T00:00:00.000Z").unwrap(), expected);
        assert_eq!(DayKey::parse("2024-06-01 12:00:00.000").unwrap(), expected);
        assert!(DayKey::parse("2024-6-1").is_err());
        assert!(DayKey::parse("2024-06-01junk").is_err());
        assert!(DayKey::parse("").is_err());
    }
}
