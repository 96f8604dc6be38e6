use rand::Rng;
use rand::seq::IndexedRandom;
use tracing::debug;

use super::TaskService;
use crate::error::AppError;
use crate::models::{Task, TaskQuery};

/// Picks one of the user's tasks at random, ignoring the dashboard filter.
/// `Ok(None)` means there is nothing to pick from.
pub async fn spin(tasks: &TaskService) -> Result<Option<Task>, AppError> {
    let all = tasks.list_tasks(TaskQuery::all()).await?;
    let picked = pick(&all, &mut rand::rng()).cloned();
    debug!(candidates = all.len(), picked = ?picked.as_ref().map(|t| &t.id), "wheel spun");
    Ok(picked)
}

pub fn pick<'a, R: Rng + ?Sized>(tasks: &'a [Task], rng: &mut R) -> Option<&'a Task> {
    tasks.choose(rng)
}
