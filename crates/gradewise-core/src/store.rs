//! Record store trait and an in-memory implementation.
//!
//! The store is strongly consistent per record: each update is applied to
//! the current version of the record under the store's lock. Nothing is
//! transactional across records.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::GradingError;
use crate::model::{Assignment, Record, SortKey, Submission};
use crate::update::{AssignmentUpdate, SubmissionUpdate};

pub type StoreResult<T> = Result<T, GradingError>;

/// Persistence for assignments and submissions.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_assignment(&self, id: &str) -> StoreResult<Assignment>;

    async fn get_submission(&self, id: &str) -> StoreResult<Submission>;

    /// Fails with a validation error if the id is taken.
    async fn insert_assignment(&self, assignment: Assignment) -> StoreResult<()>;

    /// Fails with a validation error if the id is taken.
    async fn insert_submission(&self, submission: Submission) -> StoreResult<()>;

    async fn update_assignment(&self, id: &str, update: AssignmentUpdate)
        -> StoreResult<Assignment>;

    async fn update_submission(&self, id: &str, update: SubmissionUpdate)
        -> StoreResult<Submission>;

    /// Up to `size` assignments strictly after `after` in listing order
    /// (newest first, then id ascending).
    async fn assignment_batch(
        &self,
        after: Option<&SortKey>,
        size: usize,
    ) -> StoreResult<Vec<Assignment>>;

    /// Up to `size` submissions of one assignment strictly after `after` in
    /// listing order.
    async fn submission_batch(
        &self,
        assignment_id: &str,
        after: Option<&SortKey>,
        size: usize,
    ) -> StoreResult<Vec<Submission>>;

    /// Up to `size` submissions by one student, across assignments,
    /// strictly after `after` in listing order.
    async fn student_submission_batch(
        &self,
        student_id: &str,
        after: Option<&SortKey>,
        size: usize,
    ) -> StoreResult<Vec<Submission>>;

    async fn find_submission(
        &self,
        assignment_id: &str,
        student_id: &str,
    ) -> StoreResult<Option<Submission>>;
}

/// Records kept in listing order with an id index.
#[derive(Debug)]
struct Ordered<R> {
    by_key: BTreeMap<SortKey, R>,
    keys: HashMap<String, SortKey>,
}

impl<R: Record> Ordered<R> {
    fn new() -> Self {
        Self {
            by_key: BTreeMap::new(),
            keys: HashMap::new(),
        }
    }

    fn get(&self, id: &str) -> Option<&R> {
        self.keys.get(id).and_then(|key| self.by_key.get(key))
    }

    fn insert(&mut self, record: R) -> bool {
        if self.keys.contains_key(record.id()) {
            return false;
        }
        let key = record.sort_key();
        self.keys.insert(record.id().to_string(), key.clone());
        self.by_key.insert(key, record);
        true
    }

    /// Apply `f` to a copy of the record and commit only if it succeeds.
    fn modify<F>(&mut self, id: &str, f: F) -> Option<StoreResult<R>>
    where
        F: FnOnce(&mut R) -> StoreResult<()>,
    {
        let key = self.keys.get(id)?.clone();
        let mut record = self.by_key.get(&key)?.clone();
        if let Err(e) = f(&mut record) {
            return Some(Err(e));
        }
        self.by_key.remove(&key);
        let new_key = record.sort_key();
        self.keys.insert(id.to_string(), new_key.clone());
        self.by_key.insert(new_key, record.clone());
        Some(Ok(record))
    }

    fn after<'a>(&'a self, after: Option<&SortKey>) -> impl Iterator<Item = &'a R> + 'a {
        let lower = match after {
            Some(key) => Bound::Excluded(key.clone()),
            None => Bound::Unbounded,
        };
        self.by_key
            .range((lower, Bound::Unbounded))
            .map(|(_, record)| record)
    }

    fn values(&self) -> impl Iterator<Item = &R> {
        self.by_key.values()
    }
}

/// In-memory [`RecordStore`] used by tests and the CLI.
#[derive(Debug)]
pub struct MemoryStore {
    assignments: RwLock<Ordered<Assignment>>,
    submissions: RwLock<Ordered<Submission>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            assignments: RwLock::new(Ordered::new()),
            submissions: RwLock::new(Ordered::new()),
        }
    }

    /// Build a store from existing records. Duplicate ids are rejected.
    pub async fn with_records(
        assignments: Vec<Assignment>,
        submissions: Vec<Submission>,
    ) -> StoreResult<Self> {
        let store = Self::new();
        for assignment in assignments {
            store.insert_assignment(assignment).await?;
        }
        for submission in submissions {
            store.insert_submission(submission).await?;
        }
        Ok(store)
    }

    /// All records in listing order.
    pub async fn snapshot(&self) -> (Vec<Assignment>, Vec<Submission>) {
        let assignments = self.assignments.read().await.values().cloned().collect();
        let submissions = self.submissions.read().await.values().cloned().collect();
        (assignments, submissions)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get_assignment(&self, id: &str) -> StoreResult<Assignment> {
        self.assignments
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| GradingError::not_found("assignment", id))
    }

    async fn get_submission(&self, id: &str) -> StoreResult<Submission> {
        self.submissions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| GradingError::not_found("submission", id))
    }

    async fn insert_assignment(&self, assignment: Assignment) -> StoreResult<()> {
        let id = assignment.id.clone();
        if self.assignments.write().await.insert(assignment) {
            Ok(())
        } else {
            Err(GradingError::Validation(format!(
                "assignment id already exists: {id}"
            )))
        }
    }

    async fn insert_submission(&self, submission: Submission) -> StoreResult<()> {
        let id = submission.id.clone();
        if self.submissions.write().await.insert(submission) {
            Ok(())
        } else {
            Err(GradingError::Validation(format!(
                "submission id already exists: {id}"
            )))
        }
    }

    async fn update_assignment(
        &self,
        id: &str,
        update: AssignmentUpdate,
    ) -> StoreResult<Assignment> {
        self.assignments
            .write()
            .await
            .modify(id, |assignment| update.apply(assignment, Utc::now()))
            .unwrap_or_else(|| Err(GradingError::not_found("assignment", id)))
    }

    async fn update_submission(
        &self,
        id: &str,
        update: SubmissionUpdate,
    ) -> StoreResult<Submission> {
        self.submissions
            .write()
            .await
            .modify(id, |submission| update.apply(submission, Utc::now()))
            .unwrap_or_else(|| Err(GradingError::not_found("submission", id)))
    }

    async fn assignment_batch(
        &self,
        after: Option<&SortKey>,
        size: usize,
    ) -> StoreResult<Vec<Assignment>> {
        Ok(self
            .assignments
            .read()
            .await
            .after(after)
            .take(size)
            .cloned()
            .collect())
    }

    async fn submission_batch(
        &self,
        assignment_id: &str,
        after: Option<&SortKey>,
        size: usize,
    ) -> StoreResult<Vec<Submission>> {
        Ok(self
            .submissions
            .read()
            .await
            .after(after)
            .filter(|s| s.assignment_id == assignment_id)
            .take(size)
            .cloned()
            .collect())
    }

    async fn student_submission_batch(
        &self,
        student_id: &str,
        after: Option<&SortKey>,
        size: usize,
    ) -> StoreResult<Vec<Submission>> {
        Ok(self
            .submissions
            .read()
            .await
            .after(after)
            .filter(|s| s.student_id == student_id)
            .take(size)
            .cloned()
            .collect())
    }

    async fn find_submission(
        &self,
        assignment_id: &str,
        student_id: &str,
    ) -> StoreResult<Option<Submission>> {
        Ok(self
            .submissions
            .read()
            .await
            .values()
            .find(|s| s.assignment_id == assignment_id && s.student_id == student_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SubmissionStatus;
    use chrono::{DateTime, Duration};

    fn assignment(id: &str, updated_at: DateTime<Utc>) -> Assignment {
        Assignment {
            id: id.into(),
            teacher_id: "t1".into(),
            title: id.into(),
            description: None,
            due_date: None,
            max_score: 100.0,
            rubric: None,
            ai_assist: false,
            access_control: None,
            created_at: updated_at,
            updated_at,
        }
    }

    fn submission(id: &str, assignment_id: &str) -> Submission {
        let now = Utc::now();
        Submission {
            id: id.into(),
            assignment_id: assignment_id.into(),
            student_id: format!("stu-{id}"),
            content: None,
            attachments: vec![],
            status: SubmissionStatus::Draft,
            submitted_at: None,
            score: None,
            max_score: None,
            grade: None,
            feedback: None,
            rubric_scores: Default::default(),
            grader_id: None,
            graded_at: None,
            ai_review: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn batches_follow_listing_order() {
        let t0 = Utc::now();
        let store = MemoryStore::with_records(
            vec![
                assignment("b", t0),
                assignment("a", t0),
                assignment("c", t0 + Duration::seconds(5)),
            ],
            vec![],
        )
        .await
        .unwrap();

        let first = store.assignment_batch(None, 2).await.unwrap();
        let ids: Vec<&str> = first.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);

        let cursor = first.last().unwrap().sort_key();
        let rest = store.assignment_batch(Some(&cursor), 2).await.unwrap();
        let ids: Vec<&str> = rest.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[tokio::test]
    async fn student_batches_span_assignments() {
        let mut other = submission("s3", "a2");
        other.student_id = "stu-s1".into();
        let store = MemoryStore::with_records(
            vec![],
            vec![submission("s1", "a1"), submission("s2", "a1"), other],
        )
        .await
        .unwrap();

        let first = store
            .student_submission_batch("stu-s1", None, 1)
            .await
            .unwrap();
        assert_eq!(first.len(), 1);
        let cursor = first.last().unwrap().sort_key();
        let rest = store
            .student_submission_batch("stu-s1", Some(&cursor), 10)
            .await
            .unwrap();
        let mut ids: Vec<&str> = first.iter().chain(&rest).map(|s| s.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["s1", "s3"]);
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let store = MemoryStore::new();
        store.insert_assignment(assignment("a", Utc::now())).await.unwrap();
        let err = store
            .insert_assignment(assignment("a", Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, GradingError::Validation(_)));
    }

    #[tokio::test]
    async fn failed_update_leaves_record_untouched() {
        let store = MemoryStore::with_records(vec![], vec![submission("s1", "a1")])
            .await
            .unwrap();
        let err = store
            .update_submission("s1", SubmissionUpdate::Release)
            .await
            .unwrap_err();
        assert!(matches!(err, GradingError::InvalidTransition { .. }));
        let stored = store.get_submission("s1").await.unwrap();
        assert_eq!(stored.status, SubmissionStatus::Draft);

        let updated = store
            .update_submission("s1", SubmissionUpdate::Submit)
            .await
            .unwrap();
        assert_eq!(updated.status, SubmissionStatus::Submitted);
        assert_eq!(
            store.get_submission("s1").await.unwrap().status,
            SubmissionStatus::Submitted
        );
    }

    #[tokio::test]
    async fn missing_records_are_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get_submission("nope").await.unwrap_err(),
            GradingError::NotFound { .. }
        ));
        assert!(matches!(
            store
                .update_assignment("nope", AssignmentUpdate::default())
                .await
                .unwrap_err(),
            GradingError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn submissions_are_scoped_to_assignment() {
        let store = MemoryStore::with_records(
            vec![],
            vec![
                submission("s1", "a1"),
                submission("s2", "a2"),
                submission("s3", "a1"),
            ],
        )
        .await
        .unwrap();
        let batch = store.submission_batch("a1", None, 10).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|s| s.assignment_id == "a1"));
        let found = store.find_submission("a2", "stu-s2").await.unwrap();
        assert_eq!(found.map(|s| s.id), Some("s2".to_string()));
    }
}
