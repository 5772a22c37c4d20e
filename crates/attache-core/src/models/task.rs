use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Relocate a completed upload from the staging backend to its permanent backend.
    MoveToStorage,
}

impl Display for TaskType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TaskType::MoveToStorage => write!(f, "move_to_storage"),
        }
    }
}

impl FromStr for TaskType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "move_to_storage" => Ok(TaskType::MoveToStorage),
            _ => Err(anyhow::anyhow!("Invalid task type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Scheduled,
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Scheduled => write!(f, "scheduled"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "scheduled" => Ok(TaskStatus::Scheduled),
            _ => Err(anyhow::anyhow!("Invalid task status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub payload: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub timeout_seconds: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for Task {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Task {
            id: row.try_get("id")?,
            task_type: row.try_get::<String, _>("task_type")?.parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse task_type: {}", e).into())
            })?,
            status: row.try_get::<String, _>("status")?.parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse status: {}", e).into())
            })?,
            payload: row.try_get("payload")?,
            result: row.try_get("result")?,
            scheduled_at: row.try_get("scheduled_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            retry_count: row.try_get("retry_count")?,
            max_retries: row.try_get("max_retries")?,
            timeout_seconds: row.try_get("timeout_seconds")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl Task {
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Extract the payload as a typed struct, returning an error on failure.
    pub fn try_payload_as<P: TaskPayload>(&self) -> Result<P, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Trait for type-safe task payloads
pub trait TaskPayload: Serialize + for<'de> Deserialize<'de> {
    fn task_type() -> TaskType;
}

/// Payload of a relocation task: `{"targetId": "<attachment id>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveToStoragePayload {
    #[serde(rename = "targetId")]
    pub target_id: Uuid,
}

impl TaskPayload for MoveToStoragePayload {
    fn task_type() -> TaskType {
        TaskType::MoveToStorage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_type_round_trips_through_text() {
        let text = TaskType::MoveToStorage.to_string();
        assert_eq!(text, "move_to_storage");
        assert_eq!(text.parse::<TaskType>().ok(), Some(TaskType::MoveToStorage));
        assert!("video_transcode".parse::<TaskType>().is_err());
    }

    #[test]
    fn test_move_to_storage_payload_uses_target_id_key() {
        let id = Uuid::new_v4();
        let value = serde_json::to_value(MoveToStoragePayload { target_id: id }).unwrap();
        assert_eq!(value, serde_json::json!({ "targetId": id.to_string() }));
    }

    #[test]
    fn test_can_retry() {
        let now = Utc::now();
        let mut task = Task {
            id: Uuid::new_v4(),
            task_type: TaskType::MoveToStorage,
            status: TaskStatus::Failed,
            payload: serde_json::json!({}),
            result: None,
            scheduled_at: now,
            started_at: None,
            completed_at: None,
            retry_count: 2,
            max_retries: 3,
            timeout_seconds: None,
            created_at: now,
            updated_at: now,
        };
        assert!(task.can_retry());
        task.retry_count = 3;
        assert!(!task.can_retry());
    }
}
