use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Server-assigned task identity. Opaque to the client.
pub type TaskId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    #[default]
    ArtCrafts,
    Nature,
    Family,
    Sport,
    Friends,
    Meditation,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [TaskStatus::Todo, TaskStatus::InProgress, TaskStatus::Completed];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
        }
    }
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::ArtCrafts,
        Category::Nature,
        Category::Family,
        Category::Sport,
        Category::Friends,
        Category::Meditation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::ArtCrafts => "art_crafts",
            Category::Nature => "nature",
            Category::Family => "family",
            Category::Sport => "sport",
            Category::Friends => "friends",
            Category::Meditation => "meditation",
        }
    }
}

macro_rules! wire_enum_text {
    ($ty:ty, $what:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                <$ty>::ALL
                    .into_iter()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| AppError::Validation(format!("unknown {}: {}", $what, s)))
            }
        }
    };
}

wire_enum_text!(TaskStatus, "status");
wire_enum_text!(Priority, "priority");
wire_enum_text!(Category, "category");

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Collaborator {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(rename = "_id", alias = "id")]
    pub id: TaskId,
    #[serde(rename = "userId", alias = "owner")]
    pub owner: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub is_collaborative: bool,
    #[serde(default)]
    pub collaborators: BTreeSet<Collaborator>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Merges the fields present in `patch`; identity, owner and timestamps
    /// are left for the service to manage.
    pub fn apply_patch(&mut self, patch: &TaskPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.clone());
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(is_collaborative) = patch.is_collaborative {
            self.is_collaborative = is_collaborative;
        }
        if let Some(collaborators) = &patch.collaborators {
            self.collaborators = collaborators.clone();
        }
    }

    pub fn matches(&self, query: &TaskQuery) -> bool {
        query.status.is_none_or(|s| s == self.status)
            && query.category.is_none_or(|c| c == self.category)
    }
}

/// Body of `POST /tasks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_collaborative: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collaborators: Option<BTreeSet<Collaborator>>,
}

impl NewTask {
    /// A new task carrying the task form's defaults.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: Some(String::new()),
            status: Some(TaskStatus::Todo),
            priority: Some(Priority::Medium),
            category: Some(Category::ArtCrafts),
            is_collaborative: Some(false),
            collaborators: Some(BTreeSet::new()),
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.title.trim().is_empty() {
            return Err(AppError::Validation("Title is required".to_string()));
        }
        if self.collaborators.as_ref().is_some_and(|c| !c.is_empty())
            && self.is_collaborative == Some(false)
        {
            return Err(AppError::Validation(
                "Collaborators require a collaborative task".to_string(),
            ));
        }
        Ok(())
    }
}

/// Partial update sent as the body of `PUT /tasks/:id`. Absent fields are
/// left untouched by the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_collaborative: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collaborators: Option<BTreeSet<Collaborator>>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.is_empty() {
            return Err(AppError::Validation("Nothing to update".to_string()));
        }
        if self.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(AppError::Validation("Title cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// Server-side list filter. `None` places no constraint on that field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TaskQuery {
    pub status: Option<TaskStatus>,
    pub category: Option<Category>,
}

impl TaskQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn to_params(&self) -> Vec<(&'static str, &'static str)> {
        let mut params = Vec::new();
        if let Some(status) = self.status {
            params.push(("status", status.as_str()));
        }
        if let Some(category) = self.category {
            params.push(("category", category.as_str()));
        }
        params
    }
}

impl fmt::Display for TaskQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "status={} category={}",
            self.status.map_or("*", |s| s.as_str()),
            self.category.map_or("*", |c| c.as_str())
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> serde_json::Value {
        serde_json::json!({
            "_id": "t1",
            "userId": "u1",
            "title": "Read",
            "status": "in_progress",
            "priority": "high",
            "category": "nature",
            "isCollaborative": true,
            "collaborators": [
                {"_id": "c2", "name": "Bo", "email": "bo@b.com"},
                {"_id": "c1", "name": "Al", "email": "al@b.com"}
            ],
            "createdAt": "2025-03-01T10:00:00Z",
            "updatedAt": "2025-03-02T10:00:00Z"
        })
    }

    #[test]
    fn test_task_wire_format() {
        let task: Task = serde_json::from_value(sample_json()).expect("decode task");
        assert_eq!(task.id, "t1");
        assert_eq!(task.owner, "u1");
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.category, Category::Nature);
        assert!(task.description.is_none());
        assert!(task.updated_at >= task.created_at);

        let back = serde_json::to_value(&task).expect("encode task");
        assert_eq!(back["_id"], "t1");
        assert_eq!(back["isCollaborative"], true);
    }

    #[test]
    fn test_collaborator_order_is_insignificant() {
        let a: Task = serde_json::from_value(sample_json()).unwrap();
        let mut reversed = sample_json();
        reversed["collaborators"]
            .as_array_mut()
            .unwrap()
            .reverse();
        let b: Task = serde_json::from_value(reversed).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_patch_serializes_only_present_fields() {
        let patch = TaskPatch::status(TaskStatus::Completed);
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json, serde_json::json!({"status": "completed"}));
    }

    #[test]
    fn test_patch_validation() {
        assert!(TaskPatch::default().validate().is_err());
        let blank = TaskPatch {
            title: Some("   ".to_string()),
            ..TaskPatch::default()
        };
        assert!(blank.validate().is_err());
        assert!(TaskPatch::status(TaskStatus::Todo).validate().is_ok());
    }

    #[test]
    fn test_apply_patch_merges_fields() {
        let mut task: Task = serde_json::from_value(sample_json()).unwrap();
        let patch = TaskPatch {
            title: Some("Read more".to_string()),
            priority: Some(Priority::Low),
            ..TaskPatch::default()
        };
        task.apply_patch(&patch);
        assert_eq!(task.title, "Read more");
        assert_eq!(task.priority, Priority::Low);
        assert_eq!(task.status, TaskStatus::InProgress);
    }

    #[test]
    fn test_new_task_defaults_and_validation() {
        let task = NewTask::new("Paint");
        assert_eq!(task.status, Some(TaskStatus::Todo));
        assert_eq!(task.priority, Some(Priority::Medium));
        assert_eq!(task.category, Some(Category::ArtCrafts));
        assert!(task.validate().is_ok());
        assert!(NewTask::new("").validate().is_err());
    }

    #[test]
    fn test_query_params_omit_unconstrained_fields() {
        assert!(TaskQuery::all().to_params().is_empty());
        let q = TaskQuery {
            status: Some(TaskStatus::Todo),
            category: None,
        };
        assert_eq!(q.to_params(), vec![("status", "todo")]);
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("art_crafts".parse::<Category>().unwrap(), Category::ArtCrafts);
        assert_eq!("in_progress".parse::<TaskStatus>().unwrap(), TaskStatus::InProgress);
        assert!("urgent".parse::<Priority>().is_err());
    }
}
