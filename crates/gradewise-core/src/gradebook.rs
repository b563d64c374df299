//! Request-scoped gradebook operations.
//!
//! Each call resolves the actor's groups once, checks access against the
//! affected records, applies one enumerated update through the store and
//! emits a change event.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::access::{is_grading_identity, record_permitted};
use crate::error::GradingError;
use crate::events::{ChangeEvent, EntityType, EventNotifier, TracingNotifier};
use crate::export::GradeRow;
use crate::model::{
    default_max_score, AccessPolicy, Actor, Assignment, Permission, Role, Rubric, Submission,
    SubmissionStatus,
};
use crate::paginate::{
    AssignmentSource, PageRequest, PermissionedPaginator, StudentSubmissionSource,
    SubmissionSource,
};
use crate::rubric::{aggregate, DEFAULT_REFERENCE_SCALE_MAX};
use crate::statistics::{collect_statistics, AssignmentStatistics};
use crate::store::RecordStore;
use crate::traits::GroupResolver;
use crate::update::{Authority, AssignmentUpdate, SubmissionUpdate, TeacherGrade};

/// Fields for a new assignment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAssignment {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub max_score: Option<f64>,
    #[serde(default)]
    pub rubric: Option<Rubric>,
    #[serde(default)]
    pub ai_assist: bool,
    #[serde(default)]
    pub access_control: Option<AccessPolicy>,
}

/// A teacher's manual grade.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GradeRequest {
    #[serde(default)]
    pub rubric_scores: BTreeMap<String, f64>,
    /// Overrides the score computed from `rubric_scores`.
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub feedback: Option<String>,
    /// Use the AI feedback draft when no feedback is given.
    #[serde(default)]
    pub adopt_ai_draft: bool,
}

/// Gradebook service over a record store.
pub struct Gradebook {
    store: Arc<dyn RecordStore>,
    groups: Arc<dyn GroupResolver>,
    notifier: Arc<dyn EventNotifier>,
    paginator: PermissionedPaginator,
    reference_scale_max: f64,
}

impl Gradebook {
    pub fn new(store: Arc<dyn RecordStore>, groups: Arc<dyn GroupResolver>) -> Self {
        Self {
            store,
            groups,
            notifier: Arc::new(TracingNotifier),
            paginator: PermissionedPaginator::default(),
            reference_scale_max: DEFAULT_REFERENCE_SCALE_MAX,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn EventNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_paginator(mut self, paginator: PermissionedPaginator) -> Self {
        self.paginator = paginator;
        self
    }

    pub fn with_reference_scale_max(mut self, reference_scale_max: f64) -> Self {
        self.reference_scale_max = reference_scale_max;
        self
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Assignments `actor` holds `permission` on, newest first.
    #[instrument(skip(self, actor), fields(principal = %actor.principal_id))]
    pub async fn list_assignments(
        &self,
        actor: &Actor,
        permission: Permission,
        skip: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Assignment>, GradingError> {
        let groups = self.groups.groups_of(&actor.principal_id).await?;
        let request = PageRequest {
            principal_id: &actor.principal_id,
            permission,
            group_ids: &groups,
            skip,
            limit,
        };
        self.paginator
            .list(&AssignmentSource(self.store.as_ref()), &request)
            .await
    }

    pub async fn get_assignment(
        &self,
        actor: &Actor,
        id: &str,
    ) -> Result<Assignment, GradingError> {
        let assignment = self.store.get_assignment(id).await?;
        let groups = self.groups.groups_of(&actor.principal_id).await?;
        if !record_permitted(&assignment, &actor.principal_id, Permission::Read, &groups) {
            return Err(denied(actor, "read assignment", id));
        }
        Ok(assignment)
    }

    /// Create an assignment owned by `actor`.
    #[instrument(skip(self, actor, new), fields(principal = %actor.principal_id))]
    pub async fn create_assignment(
        &self,
        actor: &Actor,
        new: NewAssignment,
    ) -> Result<Assignment, GradingError> {
        if actor.role == Role::Student {
            return Err(denied(actor, "create assignment", &new.title));
        }
        if new.title.trim().is_empty() {
            return Err(GradingError::Validation("title must not be empty".into()));
        }
        let max_score = new.max_score.unwrap_or_else(default_max_score);
        if !max_score.is_finite() || max_score <= 0.0 {
            return Err(GradingError::Validation(format!(
                "max score must be positive, got {max_score}"
            )));
        }
        if let Some(rubric) = &new.rubric {
            rubric.validate()?;
        }

        let now = Utc::now();
        let assignment = Assignment {
            id: Uuid::new_v4().to_string(),
            teacher_id: actor.principal_id.clone(),
            title: new.title,
            description: new.description,
            due_date: new.due_date,
            max_score,
            rubric: new.rubric,
            ai_assist: new.ai_assist,
            access_control: new.access_control,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_assignment(assignment.clone()).await?;
        self.emit(EntityType::Assignment, &assignment.id, "created");
        Ok(assignment)
    }

    #[instrument(skip(self, actor, update), fields(principal = %actor.principal_id))]
    pub async fn update_assignment(
        &self,
        actor: &Actor,
        id: &str,
        update: AssignmentUpdate,
    ) -> Result<Assignment, GradingError> {
        let assignment = self.store.get_assignment(id).await?;
        let groups = self.groups.groups_of(&actor.principal_id).await?;
        let can_write = actor.role == Role::Admin
            || record_permitted(&assignment, &actor.principal_id, Permission::Write, &groups);
        update.authorize(actor, &assignment, can_write)?;

        let updated = self.store.update_assignment(id, update).await?;
        self.emit(EntityType::Assignment, id, "updated");
        Ok(updated)
    }

    /// Start a draft submission for `actor`. One per student and assignment.
    #[instrument(skip(self, actor, content), fields(principal = %actor.principal_id))]
    pub async fn create_submission(
        &self,
        actor: &Actor,
        assignment_id: &str,
        content: Option<String>,
        attachments: Vec<String>,
    ) -> Result<Submission, GradingError> {
        let assignment = self.get_assignment(actor, assignment_id).await?;
        if self
            .store
            .find_submission(assignment_id, &actor.principal_id)
            .await?
            .is_some()
        {
            return Err(GradingError::Validation(format!(
                "{} already has a submission for assignment {assignment_id}",
                actor.principal_id
            )));
        }

        let now = Utc::now();
        let submission = Submission {
            id: Uuid::new_v4().to_string(),
            assignment_id: assignment.id,
            student_id: actor.principal_id.clone(),
            content,
            attachments,
            status: SubmissionStatus::Draft,
            submitted_at: None,
            score: None,
            max_score: Some(assignment.max_score),
            grade: None,
            feedback: None,
            rubric_scores: BTreeMap::new(),
            grader_id: None,
            graded_at: None,
            ai_review: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_submission(submission.clone()).await?;
        self.emit(EntityType::Submission, &submission.id, submission.status.as_str());
        Ok(submission)
    }

    /// The submission, if `actor` is its student or a grader.
    pub async fn get_submission(
        &self,
        actor: &Actor,
        id: &str,
    ) -> Result<Submission, GradingError> {
        let submission = self.store.get_submission(id).await?;
        if submission.student_id == actor.principal_id {
            return Ok(submission);
        }
        let (_, is_grader) = self.grader_context(actor, &submission).await?;
        if !is_grader {
            return Err(denied(actor, "read submission", id));
        }
        Ok(submission)
    }

    /// Submissions of one assignment, newest first. Graders see all of
    /// them; a student who can read the assignment sees only their own.
    #[instrument(skip(self, actor), fields(principal = %actor.principal_id))]
    pub async fn list_submissions(
        &self,
        actor: &Actor,
        assignment_id: &str,
        skip: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Submission>, GradingError> {
        let assignment = self.store.get_assignment(assignment_id).await?;
        let groups = self.groups.groups_of(&actor.principal_id).await?;
        let source = SubmissionSource {
            store: self.store.as_ref(),
            assignment_id,
        };
        if is_grading_identity(actor, &assignment, &groups) {
            return self.paginator.list_all(&source, skip, limit).await;
        }
        if !record_permitted(&assignment, &actor.principal_id, Permission::Read, &groups) {
            return Err(denied(actor, "list submissions for assignment", assignment_id));
        }
        let request = PageRequest {
            principal_id: &actor.principal_id,
            permission: Permission::Read,
            group_ids: &groups,
            skip,
            limit,
        };
        self.paginator.list(&source, &request).await
    }

    /// The actor's own submissions across all assignments, newest first.
    pub async fn list_own_submissions(
        &self,
        actor: &Actor,
        skip: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Submission>, GradingError> {
        // Submissions carry an owner-only policy, so groups never matter.
        let groups = HashSet::new();
        let request = PageRequest {
            principal_id: &actor.principal_id,
            permission: Permission::Read,
            group_ids: &groups,
            skip,
            limit,
        };
        let source = StudentSubmissionSource {
            store: self.store.as_ref(),
            student_id: &actor.principal_id,
        };
        self.paginator.list(&source, &request).await
    }

    /// Apply a student or grader update. AI reviews are recorded only by the
    /// grading orchestrator.
    #[instrument(skip(self, actor, update), fields(principal = %actor.principal_id, kind = update.kind()))]
    pub async fn update_submission(
        &self,
        actor: &Actor,
        id: &str,
        update: SubmissionUpdate,
    ) -> Result<Submission, GradingError> {
        if update.authority() == Authority::System {
            return Err(denied(actor, "record an AI review on submission", id));
        }
        let submission = self.store.get_submission(id).await?;
        let is_grader = match update.authority() {
            Authority::StudentOwner => false,
            _ => self.grader_context(actor, &submission).await?.1,
        };
        update.authorize(actor, &submission, is_grader)?;

        let updated = self.store.update_submission(id, update).await?;
        self.emit(EntityType::Submission, id, updated.status.as_str());
        Ok(updated)
    }

    pub async fn submit(&self, actor: &Actor, id: &str) -> Result<Submission, GradingError> {
        self.update_submission(actor, id, SubmissionUpdate::Submit)
            .await
    }

    pub async fn release(&self, actor: &Actor, id: &str) -> Result<Submission, GradingError> {
        self.update_submission(actor, id, SubmissionUpdate::Release)
            .await
    }

    /// Record a teacher's grade.
    ///
    /// Without an explicit score, the rubric scores are aggregated against
    /// the assignment's maximum. Rubric scores are validated either way.
    #[instrument(skip(self, actor, request), fields(principal = %actor.principal_id))]
    pub async fn grade_submission(
        &self,
        actor: &Actor,
        id: &str,
        request: GradeRequest,
    ) -> Result<Submission, GradingError> {
        let submission = self.store.get_submission(id).await?;
        let (assignment, is_grader) = self.grader_context(actor, &submission).await?;
        if !is_grader {
            return Err(denied(actor, "grade submission", id));
        }

        let computed = if request.rubric_scores.is_empty() {
            None
        } else {
            let rubric = assignment.rubric.as_ref().ok_or_else(|| {
                GradingError::Validation(format!(
                    "assignment {} has no rubric to score against",
                    assignment.id
                ))
            })?;
            let aggregation = aggregate(
                rubric,
                &request.rubric_scores,
                self.reference_scale_max,
                assignment.max_score,
            )?;
            Some(aggregation.final_score)
        };

        let score = match (request.score, computed) {
            (Some(score), _) => {
                if !score.is_finite() || score < 0.0 || score > assignment.max_score {
                    return Err(GradingError::Validation(format!(
                        "score {score} is outside [0, {}]",
                        assignment.max_score
                    )));
                }
                score
            }
            (None, Some(score)) => score,
            (None, None) => {
                return Err(GradingError::Validation(
                    "a grade needs a score or rubric scores".into(),
                ))
            }
        };

        let feedback = match request.feedback {
            Some(feedback) => Some(feedback),
            None if request.adopt_ai_draft => submission
                .ai_review
                .as_ref()
                .map(|review| review.feedback_draft.clone()),
            None => None,
        };

        let update = SubmissionUpdate::Grade(TeacherGrade {
            rubric_scores: request.rubric_scores,
            score,
            grade: request.grade,
            feedback,
            grader_id: actor.principal_id.clone(),
        });
        let updated = self.store.update_submission(id, update).await?;
        tracing::info!(submission_id = id, score, "submission graded");
        self.emit(EntityType::Submission, id, updated.status.as_str());
        Ok(updated)
    }

    /// Submission statistics for an assignment, for its graders.
    pub async fn statistics(
        &self,
        actor: &Actor,
        assignment_id: &str,
    ) -> Result<AssignmentStatistics, GradingError> {
        let assignment = self.store.get_assignment(assignment_id).await?;
        let groups = self.groups.groups_of(&actor.principal_id).await?;
        if !is_grading_identity(actor, &assignment, &groups) {
            return Err(denied(actor, "view statistics for assignment", assignment_id));
        }
        collect_statistics(
            self.store.as_ref(),
            assignment_id,
            self.paginator.batch_size(),
        )
        .await
    }

    /// One grade row per submission of the assignment, for its graders.
    #[instrument(skip(self, actor), fields(principal = %actor.principal_id))]
    pub async fn export_grades(
        &self,
        actor: &Actor,
        assignment_id: &str,
    ) -> Result<Vec<GradeRow>, GradingError> {
        let assignment = self.store.get_assignment(assignment_id).await?;
        let groups = self.groups.groups_of(&actor.principal_id).await?;
        if !is_grading_identity(actor, &assignment, &groups) {
            return Err(denied(actor, "export grades for assignment", assignment_id));
        }
        let source = SubmissionSource {
            store: self.store.as_ref(),
            assignment_id,
        };
        let submissions = self.paginator.list_all(&source, 0, None).await?;
        let rows: Vec<GradeRow> = submissions.iter().map(GradeRow::from).collect();
        tracing::info!(assignment_id, rows = rows.len(), "grades exported");
        Ok(rows)
    }

    async fn grader_context(
        &self,
        actor: &Actor,
        submission: &Submission,
    ) -> Result<(Assignment, bool), GradingError> {
        let assignment = self.store.get_assignment(&submission.assignment_id).await?;
        let groups: HashSet<String> = self.groups.groups_of(&actor.principal_id).await?;
        let is_grader = is_grading_identity(actor, &assignment, &groups);
        Ok((assignment, is_grader))
    }

    fn emit(&self, entity_type: EntityType, id: &str, state: &str) {
        self.notifier.notify(ChangeEvent::new(entity_type, id, state));
    }
}

fn denied(actor: &Actor, action: &str, id: &str) -> GradingError {
    GradingError::PermissionDenied(format!("{} may not {action} {id}", actor.principal_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BroadcastNotifier;
    use crate::model::{AiReview, Criterion};
    use crate::store::MemoryStore;
    use crate::traits::StaticGroups;

    fn rubric() -> Rubric {
        Rubric::new(vec![
            Criterion::new("logic", "Logic", Some(0.6)),
            Criterion::new("accuracy", "Accuracy", Some(0.4)),
        ])
    }

    fn gradebook() -> (Gradebook, Arc<BroadcastNotifier>) {
        let groups = StaticGroups::default()
            .with_member("class-7a", "stu1")
            .with_member("class-7a", "stu2")
            .with_member("maths-dept", "t2");
        let notifier = Arc::new(BroadcastNotifier::default());
        let book = Gradebook::new(Arc::new(MemoryStore::new()), Arc::new(groups))
            .with_notifier(notifier.clone());
        (book, notifier)
    }

    async fn class_assignment(book: &Gradebook) -> Assignment {
        book.create_assignment(
            &Actor::teacher("t1"),
            NewAssignment {
                title: "Fractions".into(),
                rubric: Some(rubric()),
                ai_assist: true,
                access_control: Some(
                    AccessPolicy::new()
                        .with_groups(Permission::Read, ["class-7a"])
                        .with_groups(Permission::Write, ["maths-dept"]),
                ),
                ..NewAssignment::default()
            },
        )
        .await
        .unwrap()
    }

    async fn submitted(book: &Gradebook, assignment: &Assignment, student: &str) -> Submission {
        let actor = Actor::student(student);
        let draft = book
            .create_submission(&actor, &assignment.id, Some("1/2 + 1/4 = 3/4".into()), vec![])
            .await
            .unwrap();
        book.submit(&actor, &draft.id).await.unwrap()
    }

    #[tokio::test]
    async fn students_see_only_their_class_assignments() {
        let (book, _) = gradebook();
        let assignment = class_assignment(&book).await;
        book.create_assignment(
            &Actor::teacher("t1"),
            NewAssignment {
                title: "Private notes".into(),
                access_control: Some(AccessPolicy::new()),
                ..NewAssignment::default()
            },
        )
        .await
        .unwrap();

        let visible = book
            .list_assignments(&Actor::student("stu1"), Permission::Read, 0, None)
            .await
            .unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, assignment.id);

        let outsider = book
            .list_assignments(&Actor::student("stu9"), Permission::Read, 0, None)
            .await
            .unwrap();
        assert!(outsider.is_empty());
        assert!(matches!(
            book.get_assignment(&Actor::student("stu9"), &assignment.id)
                .await
                .unwrap_err(),
            GradingError::PermissionDenied(_)
        ));

        let owned = book
            .list_assignments(&Actor::teacher("t1"), Permission::Write, 0, None)
            .await
            .unwrap();
        assert_eq!(owned.len(), 2);
    }

    #[tokio::test]
    async fn submission_lifecycle_copies_max_score() {
        let (book, _) = gradebook();
        let assignment = class_assignment(&book).await;
        let submission = submitted(&book, &assignment, "stu1").await;
        assert_eq!(submission.status, SubmissionStatus::Submitted);
        assert_eq!(submission.max_score, Some(100.0));
        assert!(submission.submitted_at.is_some());

        // One submission per student.
        let err = book
            .create_submission(&Actor::student("stu1"), &assignment.id, None, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, GradingError::Validation(_)));

        // Students may not edit after submitting.
        let err = book
            .update_submission(
                &Actor::student("stu1"),
                &submission.id,
                SubmissionUpdate::EditContent {
                    content: Some("changed".into()),
                    attachments: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GradingError::Validation(_)));

        // Other students may not touch it at all.
        let err = book.submit(&Actor::student("stu2"), &submission.id).await.unwrap_err();
        assert!(matches!(err, GradingError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn students_cannot_grade_or_record_reviews() {
        let (book, _) = gradebook();
        let assignment = class_assignment(&book).await;
        let submission = submitted(&book, &assignment, "stu1").await;
        let student = Actor::student("stu1");

        let err = book
            .grade_submission(
                &student,
                &submission.id,
                GradeRequest {
                    score: Some(100.0),
                    ..GradeRequest::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GradingError::PermissionDenied(_)));

        let review = AiReview {
            rubric_scores: BTreeMap::new(),
            feedback_draft: String::new(),
            score: 100.0,
            fallback_criteria: vec![],
            scorer: "self".into(),
            reviewed_at: Utc::now(),
        };
        let err = book
            .update_submission(&student, &submission.id, SubmissionUpdate::RecordAiReview(review))
            .await
            .unwrap_err();
        assert!(matches!(err, GradingError::PermissionDenied(_)));

        let err = book.release(&student, &submission.id).await.unwrap_err();
        assert!(matches!(err, GradingError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn manual_grade_aggregates_rubric_scores() {
        let (book, notifier) = gradebook();
        let assignment = class_assignment(&book).await;
        let submission = submitted(&book, &assignment, "stu1").await;
        let mut events = notifier.subscribe(EntityType::Submission, &submission.id);

        // t2 grades through the department's write grant.
        let graded = book
            .grade_submission(
                &Actor::teacher("t2"),
                &submission.id,
                GradeRequest {
                    rubric_scores: [("logic".to_string(), 4.0), ("accuracy".to_string(), 2.5)]
                        .into(),
                    grade: Some("B".into()),
                    ..GradeRequest::default()
                },
            )
            .await
            .unwrap();
        // (4*0.6 + 2.5*0.4) / 5 * 100 = 68
        assert_eq!(graded.score, Some(68.0));
        assert_eq!(graded.status, SubmissionStatus::Graded);
        assert_eq!(graded.grader_id.as_deref(), Some("t2"));
        assert!(graded.graded_at.is_some());
        assert_eq!(events.recv().await.unwrap().new_state, "graded");

        let released = book.release(&Actor::teacher("t1"), &submission.id).await.unwrap();
        assert_eq!(released.status, SubmissionStatus::Released);
    }

    #[tokio::test]
    async fn manual_grade_validates_input() {
        let (book, _) = gradebook();
        let assignment = class_assignment(&book).await;
        let submission = submitted(&book, &assignment, "stu1").await;
        let teacher = Actor::teacher("t1");

        let out_of_range = GradeRequest {
            rubric_scores: [("logic".to_string(), 7.0)].into(),
            ..GradeRequest::default()
        };
        let err = book
            .grade_submission(&teacher, &submission.id, out_of_range)
            .await
            .unwrap_err();
        assert!(matches!(err, GradingError::Validation(_)));

        let unknown = GradeRequest {
            rubric_scores: [("style".to_string(), 3.0)].into(),
            ..GradeRequest::default()
        };
        let err = book
            .grade_submission(&teacher, &submission.id, unknown)
            .await
            .unwrap_err();
        assert!(matches!(err, GradingError::Validation(_)));

        let err = book
            .grade_submission(&teacher, &submission.id, GradeRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GradingError::Validation(_)));

        let stored = book.get_submission(&teacher, &submission.id).await.unwrap();
        assert_eq!(stored.status, SubmissionStatus::Submitted);
    }

    #[tokio::test]
    async fn explicit_score_and_adopted_ai_draft() {
        let (book, _) = gradebook();
        let assignment = class_assignment(&book).await;
        let submission = submitted(&book, &assignment, "stu1").await;
        let review = AiReview {
            rubric_scores: [("logic".to_string(), 4.0)].into(),
            feedback_draft: "[Logic] Sound steps".into(),
            score: 80.0,
            fallback_criteria: vec![],
            scorer: "mock".into(),
            reviewed_at: Utc::now(),
        };
        book.store()
            .update_submission(&submission.id, SubmissionUpdate::RecordAiReview(review))
            .await
            .unwrap();

        let graded = book
            .grade_submission(
                &Actor::teacher("t1"),
                &submission.id,
                GradeRequest {
                    score: Some(85.0),
                    adopt_ai_draft: true,
                    ..GradeRequest::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(graded.score, Some(85.0));
        assert_eq!(graded.feedback.as_deref(), Some("[Logic] Sound steps"));
        // The AI review itself is preserved.
        assert_eq!(graded.ai_review.unwrap().score, 80.0);
    }

    #[tokio::test]
    async fn only_owner_changes_access_control() {
        let (book, _) = gradebook();
        let assignment = class_assignment(&book).await;

        let renamed = book
            .update_assignment(
                &Actor::teacher("t2"),
                &assignment.id,
                AssignmentUpdate {
                    title: Some("Fractions II".into()),
                    ..AssignmentUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.title, "Fractions II");

        let err = book
            .update_assignment(
                &Actor::teacher("t2"),
                &assignment.id,
                AssignmentUpdate {
                    access_control: Some(None),
                    ..AssignmentUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GradingError::PermissionDenied(_)));

        let err = book
            .update_assignment(
                &Actor::student("stu1"),
                &assignment.id,
                AssignmentUpdate {
                    title: Some("Mine now".into()),
                    ..AssignmentUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GradingError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn graders_list_every_submission() {
        let (book, _) = gradebook();
        let assignment = class_assignment(&book).await;
        let first = submitted(&book, &assignment, "stu1").await;
        let second = submitted(&book, &assignment, "stu2").await;

        // t2 grades through the department's write grant.
        let listed = book
            .list_submissions(&Actor::teacher("t2"), &assignment.id, 0, None)
            .await
            .unwrap();
        let mut ids: Vec<&str> = listed.iter().map(|s| s.id.as_str()).collect();
        ids.sort_unstable();
        let mut expected = vec![first.id.as_str(), second.id.as_str()];
        expected.sort_unstable();
        assert_eq!(ids, expected);

        let page = book
            .list_submissions(&Actor::teacher("t1"), &assignment.id, 1, Some(5))
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, listed[1].id);
    }

    #[tokio::test]
    async fn students_list_only_their_own_submissions() {
        let (book, _) = gradebook();
        let assignment = class_assignment(&book).await;
        let mine = submitted(&book, &assignment, "stu1").await;
        submitted(&book, &assignment, "stu2").await;

        let listed = book
            .list_submissions(&Actor::student("stu1"), &assignment.id, 0, None)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, mine.id);

        let err = book
            .list_submissions(&Actor::student("stu9"), &assignment.id, 0, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GradingError::PermissionDenied(_)));

        let public = book
            .create_assignment(
                &Actor::teacher("t1"),
                NewAssignment {
                    title: "Reading log".into(),
                    ..NewAssignment::default()
                },
            )
            .await
            .unwrap();
        let other = submitted(&book, &public, "stu1").await;
        let own = book
            .list_own_submissions(&Actor::student("stu1"), 0, None)
            .await
            .unwrap();
        let mut ids: Vec<&str> = own.iter().map(|s| s.id.as_str()).collect();
        ids.sort_unstable();
        let mut expected = vec![mine.id.as_str(), other.id.as_str()];
        expected.sort_unstable();
        assert_eq!(ids, expected);
        assert!(book
            .list_own_submissions(&Actor::student("stu9"), 0, None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn grade_export_is_for_graders() {
        let (book, _) = gradebook();
        let assignment = class_assignment(&book).await;
        let first = submitted(&book, &assignment, "stu1").await;
        submitted(&book, &assignment, "stu2").await;
        book.grade_submission(
            &Actor::teacher("t1"),
            &first.id,
            GradeRequest {
                score: Some(90.0),
                grade: Some("A".into()),
                ..GradeRequest::default()
            },
        )
        .await
        .unwrap();

        let rows = book
            .export_grades(&Actor::teacher("t2"), &assignment.id)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        let graded = rows.iter().find(|r| r.student_id == "stu1").unwrap();
        assert_eq!(graded.score, Some(90.0));
        assert_eq!(graded.grade.as_deref(), Some("A"));
        assert!(graded.graded_at.is_some());
        let pending = rows.iter().find(|r| r.student_id == "stu2").unwrap();
        assert_eq!(pending.status, SubmissionStatus::Submitted);
        assert_eq!(pending.score, None);

        let err = book
            .export_grades(&Actor::student("stu1"), &assignment.id)
            .await
            .unwrap_err();
        assert!(matches!(err, GradingError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn statistics_for_graders_only() {
        let (book, _) = gradebook();
        let assignment = class_assignment(&book).await;
        let first = submitted(&book, &assignment, "stu1").await;
        submitted(&book, &assignment, "stu2").await;
        book.grade_submission(
            &Actor::teacher("t1"),
            &first.id,
            GradeRequest {
                score: Some(90.0),
                grade: Some("A".into()),
                ..GradeRequest::default()
            },
        )
        .await
        .unwrap();

        let stats = book
            .statistics(&Actor::teacher("t1"), &assignment.id)
            .await
            .unwrap();
        assert_eq!(stats.submitted_count, 2);
        assert_eq!(stats.graded_count, 1);
        assert_eq!(stats.avg_score, Some(90.0));
        assert_eq!(stats.grade_distribution["A"], 1);

        let err = book
            .statistics(&Actor::student("stu1"), &assignment.id)
            .await
            .unwrap_err();
        assert!(matches!(err, GradingError::PermissionDenied(_)));
    }
}
