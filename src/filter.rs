use crate::models::{Category, TaskQuery, TaskStatus};

/// The dashboard's active filter. Holds no data of its own; the current
/// [`TaskQuery`] is the cache key for the list being displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterState {
    status: Option<TaskStatus>,
    category: Option<Category>,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            status: Some(TaskStatus::Todo),
            category: Some(Category::Family),
        }
    }
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> Option<TaskStatus> {
        self.status
    }

    pub fn category(&self) -> Option<Category> {
        self.category
    }

    /// `None` lifts the constraint on status.
    pub fn set_status(&mut self, status: Option<TaskStatus>) -> TaskQuery {
        self.status = status;
        self.query()
    }

    /// `None` lifts the constraint on category.
    pub fn set_category(&mut self, category: Option<Category>) -> TaskQuery {
        self.category = category;
        self.query()
    }

    pub fn query(&self) -> TaskQuery {
        TaskQuery {
            status: self.status,
            category: self.category,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_open_family_tasks() {
        let filter = FilterState::new();
        assert_eq!(filter.status(), Some(TaskStatus::Todo));
        assert_eq!(filter.category(), Some(Category::Family));
    }

    #[test]
    fn test_changing_filter_changes_key() {
        let mut filter = FilterState::new();
        let before = filter.query();

        let after = filter.set_category(Some(Category::Sport));
        assert_ne!(before, after);
        assert_eq!(after.category, Some(Category::Sport));
        assert_eq!(after.status, Some(TaskStatus::Todo));

        let unconstrained = filter.set_status(None);
        assert_eq!(unconstrained.status, None);
        assert_eq!(filter.query(), unconstrained);
    }
}
