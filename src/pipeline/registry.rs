use std::sync::Arc;

use dashmap::DashMap;

use super::job::ActiveJob;

/// In-process table of jobs that are running, queued, or finished but not
/// yet handed off to storage. Owned by the engine, shared by `Arc`.
#[derive(Default)]
pub struct JobRegistry {
    jobs: DashMap<String, Arc<ActiveJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: Arc<ActiveJob>) {
        self.jobs.insert(job.id().to_string(), job);
    }

    pub fn get(&self, id: &str) -> Option<Arc<ActiveJob>> {
        self.jobs.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, id: &str) -> Option<Arc<ActiveJob>> {
        self.jobs.remove(id).map(|(_, job)| job)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn all(&self) -> Vec<Arc<ActiveJob>> {
        self.jobs.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    /// Ids of jobs spawned from `definition_id` that have not reached a terminal state.
    pub fn active_for_definition(&self, definition_id: i64) -> Vec<String> {
        self.jobs
            .iter()
            .filter(|entry| entry.definition_id() == Some(definition_id))
            .filter(|entry| !entry.state().is_terminal())
            .map(|entry| entry.key().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobRecord, JobState, Policy};

    fn job(id: &str, def: Option<i64>) -> Arc<ActiveJob> {
        Arc::new(ActiveJob::new(JobRecord::new(id.into(), vec!["t".into()], Policy::default(), def)))
    }

    #[tokio::test]
    async fn test_active_for_definition() {
        let registry = JobRegistry::new();
        let a = job("a", Some(1));
        let b = job("b", Some(1));
        registry.insert(Arc::clone(&a));
        registry.insert(b.clone());
        registry.insert(job("c", None));
        b.transition(JobState::Canceled).await;

        assert_eq!(registry.active_for_definition(1), vec!["a".to_string()]);
        assert!(registry.active_for_definition(2).is_empty());
        assert_eq!(registry.len(), 3);
        assert!(registry.remove("a").is_some());
        assert!(registry.get("a").is_none());
    }
}
