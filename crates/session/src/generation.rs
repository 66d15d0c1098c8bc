//! Model generation jobs tied to a document.
//!
//! Jobs are keyed by the uuid the backend assigns when it acknowledges a start
//! request, and kept in insertion order so deleting the selected job can fall
//! back to its predecessor.

use indexmap::IndexMap;
use modelsync_protocol::SemanticsResult;
use serde::Serialize;

use crate::session::DocumentId;

pub const CANCELLED_MESSAGE: &str = "Model generation cancelled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Running,
    Completed,
    Errored,
}

impl GenerationStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, GenerationStatus::Running)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedModelSession {
    uuid: String,
    random_seed: u64,
    status: GenerationStatus,
    message: Option<String>,
    result: Option<SemanticsResult>,
    owner: DocumentId,
}

impl GeneratedModelSession {
    fn new(uuid: String, random_seed: u64, owner: DocumentId) -> Self {
        Self {
            uuid,
            random_seed,
            status: GenerationStatus::Running,
            message: None,
            result: None,
            owner,
        }
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn random_seed(&self) -> u64 {
        self.random_seed
    }

    pub fn status(&self) -> GenerationStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == GenerationStatus::Running
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn result(&self) -> Option<&SemanticsResult> {
        self.result.as_ref()
    }

    /// Id of the document session that owns this job.
    pub fn owner(&self) -> &DocumentId {
        &self.owner
    }

    /// Progress text. Ignored once the job has finished, so a late progress
    /// report cannot overwrite the final message.
    fn set_message(&mut self, message: String) -> bool {
        if !self.is_running() {
            return false;
        }
        self.message = Some(message);
        true
    }

    fn set_error(&mut self, message: String) -> bool {
        if !self.is_running() {
            return false;
        }
        self.status = GenerationStatus::Errored;
        self.message = Some(message);
        true
    }

    fn set_semantics(&mut self, result: SemanticsResult) -> bool {
        if !self.is_running() {
            return false;
        }
        self.status = GenerationStatus::Completed;
        self.message = None;
        self.result = Some(result);
        true
    }
}

/// Summary row for snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedModelSummary {
    pub uuid: String,
    pub random_seed: u64,
    pub status: GenerationStatus,
    pub message: Option<String>,
    pub has_result: bool,
}

#[derive(Debug, Clone)]
pub struct GenerationRegistry {
    owner: DocumentId,
    models: IndexMap<String, GeneratedModelSession>,
    selected: Option<String>,
    cancel_pending: bool,
}

impl GenerationRegistry {
    pub fn new(owner: DocumentId) -> Self {
        Self {
            owner,
            models: IndexMap::new(),
            selected: None,
            cancel_pending: false,
        }
    }

    /// Insert a running job and select it. A uuid that is already known is
    /// only re-selected; its state is left alone.
    pub fn add(&mut self, uuid: &str, random_seed: u64) {
        if !self.models.contains_key(uuid) {
            self.models.insert(
                uuid.to_string(),
                GeneratedModelSession::new(uuid.to_string(), random_seed, self.owner.clone()),
            );
        }
        self.select(Some(uuid));
    }

    /// Select `uuid`, or clear the selection if it is unknown or `None`.
    pub fn select(&mut self, uuid: Option<&str>) {
        self.selected = uuid
            .filter(|uuid| self.models.contains_key(*uuid))
            .map(str::to_string);
    }

    /// Remove a job regardless of its status. If it was selected, the job
    /// inserted just before it becomes selected (or nothing, if it was first).
    pub fn remove(&mut self, uuid: &str) -> Option<GeneratedModelSession> {
        let index = self.models.get_index_of(uuid)?;
        if self.selected.as_deref() == Some(uuid) {
            let previous = index
                .checked_sub(1)
                .and_then(|i| self.models.get_index(i))
                .map(|(key, _)| key.clone());
            self.selected = previous;
        }
        self.models.shift_remove(uuid)
    }

    /// Mark that a cancellation request is about to be sent. Returns `false`
    /// if nothing is running or one is already outstanding.
    pub fn begin_cancel(&mut self) -> bool {
        if self.cancel_pending || !self.generating() {
            return false;
        }
        self.cancel_pending = true;
        true
    }

    pub fn cancel_pending(&self) -> bool {
        self.cancel_pending
    }

    pub fn clear_cancel_pending(&mut self) {
        self.cancel_pending = false;
    }

    /// Backend confirmed cancellation: every running job errors out.
    /// Finished jobs are untouched.
    pub fn generation_cancelled(&mut self) {
        for model in self.models.values_mut() {
            model.set_error(CANCELLED_MESSAGE.to_string());
        }
        self.cancel_pending = false;
    }

    /// Returns `false` if the uuid is unknown or the job already finished.
    pub fn set_message(&mut self, uuid: &str, message: String) -> bool {
        self.models
            .get_mut(uuid)
            .is_some_and(|model| model.set_message(message))
    }

    pub fn set_error(&mut self, uuid: &str, message: String) -> bool {
        let applied = self
            .models
            .get_mut(uuid)
            .is_some_and(|model| model.set_error(message));
        self.settle_cancel();
        applied
    }

    pub fn set_semantics(&mut self, uuid: &str, result: SemanticsResult) -> bool {
        let applied = self
            .models
            .get_mut(uuid)
            .is_some_and(|model| model.set_semantics(result));
        self.settle_cancel();
        applied
    }

    pub fn generating(&self) -> bool {
        self.models.values().any(GeneratedModelSession::is_running)
    }

    pub fn get(&self, uuid: &str) -> Option<&GeneratedModelSession> {
        self.models.get(uuid)
    }

    pub fn selected_uuid(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn selected(&self) -> Option<&GeneratedModelSession> {
        self.selected
            .as_deref()
            .and_then(|uuid| self.models.get(uuid))
    }

    pub fn iter(&self) -> impl Iterator<Item = &GeneratedModelSession> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn summaries(&self) -> Vec<GeneratedModelSummary> {
        self.models
            .values()
            .map(|model| GeneratedModelSummary {
                uuid: model.uuid.clone(),
                random_seed: model.random_seed,
                status: model.status,
                message: model.message.clone(),
                has_result: model.result.is_some(),
            })
            .collect()
    }

    // Nothing left to cancel means nothing can be outstanding.
    fn settle_cancel(&mut self) {
        if !self.generating() {
            self.cancel_pending = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn registry() -> GenerationRegistry {
        GenerationRegistry::new(DocumentId::from("doc-1"))
    }

    #[test]
    fn deleting_selected_selects_predecessor() {
        let mut models = registry();
        models.add("u1", 42);
        models.add("u2", 7);
        assert_eq!(models.selected_uuid(), Some("u2"));

        models.remove("u2");
        assert_eq!(models.selected_uuid(), Some("u1"));

        models.remove("u1");
        assert_eq!(models.selected_uuid(), None);
        assert!(models.is_empty());
    }

    #[test]
    fn deleting_first_selected_clears_selection() {
        let mut models = registry();
        models.add("u1", 1);
        models.add("u2", 2);
        models.select(Some("u1"));

        models.remove("u1");
        assert_eq!(models.selected_uuid(), None);
    }

    #[test]
    fn deleting_unselected_keeps_selection() {
        let mut models = registry();
        models.add("u1", 1);
        models.add("u2", 2);
        models.add("u3", 3);
        models.select(Some("u2"));

        models.remove("u3");
        assert_eq!(models.selected_uuid(), Some("u2"));
        models.remove("u1");
        assert_eq!(models.selected_uuid(), Some("u2"));
        assert!(models.remove("missing").is_none());
        assert_eq!(models.selected_uuid(), Some("u2"));
    }

    #[test]
    fn selecting_unknown_uuid_clears_selection() {
        let mut models = registry();
        models.add("u1", 1);
        models.select(Some("nope"));
        assert!(models.selected().is_none());
    }

    #[test]
    fn cancellation_only_touches_running_jobs() {
        let mut models = registry();
        models.add("done", 1);
        models.add("failed", 2);
        models.add("busy", 3);
        assert!(models.set_semantics("done", SemanticsResult(json!({"nodes": []}))));
        assert!(models.set_error("failed", "out of memory".into()));

        models.generation_cancelled();

        let done = models.get("done").unwrap();
        assert_eq!(done.status(), GenerationStatus::Completed);
        assert!(done.result().is_some());

        let failed = models.get("failed").unwrap();
        assert_eq!(failed.message(), Some("out of memory"));

        let busy = models.get("busy").unwrap();
        assert_eq!(busy.status(), GenerationStatus::Errored);
        assert_eq!(busy.message(), Some(CANCELLED_MESSAGE));
        assert!(!models.generating());
    }

    #[test]
    fn terminal_states_are_final() {
        let mut models = registry();
        models.add("u1", 1);
        assert!(models.set_error("u1", "boom".into()));
        assert!(!models.set_semantics("u1", SemanticsResult(json!({}))));
        assert!(!models.set_message("u1", "still going".into()));

        let model = models.get("u1").unwrap();
        assert_eq!(model.status(), GenerationStatus::Errored);
        assert_eq!(model.message(), Some("boom"));
        assert!(model.status().is_terminal());
    }

    #[test]
    fn updates_for_absent_uuid_are_noops() {
        let mut models = registry();
        assert!(!models.set_message("ghost", "hi".into()));
        assert!(!models.set_error("ghost", "hi".into()));
        assert!(!models.set_semantics("ghost", SemanticsResult(json!(null))));
        assert!(models.is_empty());
    }

    #[test]
    fn single_outstanding_cancellation() {
        let mut models = registry();
        models.add("u1", 1);
        assert!(models.begin_cancel());
        assert!(!models.begin_cancel());

        models.generation_cancelled();
        assert!(!models.cancel_pending());
        models.add("u2", 2);
        assert!(models.begin_cancel());
    }

    #[test]
    fn nothing_running_means_nothing_to_cancel() {
        let mut models = registry();
        assert!(!models.begin_cancel());
        assert!(!models.cancel_pending());

        models.add("u1", 1);
        models.set_error("u1", "failed".into());
        assert!(!models.begin_cancel());
        assert!(!models.cancel_pending());
    }

    #[test]
    fn jobs_remember_their_owner() {
        let mut models = registry();
        models.add("u1", 9);
        let model = models.get("u1").unwrap();
        assert_eq!(model.owner(), &DocumentId::from("doc-1"));
        assert_eq!(model.random_seed(), 9);
        assert!(model.is_running());
        assert_eq!(models.summaries()[0].uuid, "u1");
    }
}
