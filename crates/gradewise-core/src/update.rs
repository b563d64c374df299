//! Enumerated update requests and their mutability rules.
//!
//! Every field a caller may change is named here, grouped by who may change
//! it. Stores apply updates atomically per record via [`SubmissionUpdate::apply`]
//! and [`AssignmentUpdate::apply`]; callers authorize first with
//! [`SubmissionUpdate::authorize`] / [`AssignmentUpdate::authorize`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GradingError;
use crate::model::{AccessPolicy, Actor, AiReview, Assignment, Role, Rubric, Submission, SubmissionStatus};

/// Who may issue an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    /// The student who owns the submission.
    StudentOwner,
    /// A grading identity for the submission's assignment.
    Grader,
    /// The grading orchestrator acting for a grader.
    System,
}

/// Teacher-authored grade, with the final score already computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeacherGrade {
    pub rubric_scores: BTreeMap<String, f64>,
    pub score: f64,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub feedback: Option<String>,
    pub grader_id: String,
}

/// A change to one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubmissionUpdate {
    /// Student edits content while the submission is a draft.
    EditContent {
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        attachments: Option<Vec<String>>,
    },
    /// Student hands the draft in.
    Submit,
    /// Teacher records a grade.
    Grade(TeacherGrade),
    /// Teacher releases a graded submission to the student.
    Release,
    /// AI-assisted grading results.
    RecordAiReview(AiReview),
}

impl SubmissionUpdate {
    pub fn authority(&self) -> Authority {
        match self {
            SubmissionUpdate::EditContent { .. } | SubmissionUpdate::Submit => {
                Authority::StudentOwner
            }
            SubmissionUpdate::Grade(_) | SubmissionUpdate::Release => Authority::Grader,
            SubmissionUpdate::RecordAiReview(_) => Authority::System,
        }
    }

    /// Short name used in logs and change events.
    pub fn kind(&self) -> &'static str {
        match self {
            SubmissionUpdate::EditContent { .. } => "edit_content",
            SubmissionUpdate::Submit => "submit",
            SubmissionUpdate::Grade(_) => "grade",
            SubmissionUpdate::Release => "release",
            SubmissionUpdate::RecordAiReview(_) => "ai_review",
        }
    }

    /// Check that `actor` may issue this update. `is_grader` says whether the
    /// actor is a grading identity for the submission's assignment.
    pub fn authorize(
        &self,
        actor: &Actor,
        submission: &Submission,
        is_grader: bool,
    ) -> Result<(), GradingError> {
        let allowed = match self.authority() {
            Authority::StudentOwner => submission.student_id == actor.principal_id,
            Authority::Grader | Authority::System => is_grader,
        };
        if allowed {
            Ok(())
        } else {
            Err(GradingError::PermissionDenied(format!(
                "{} may not {} submission {}",
                actor.principal_id,
                self.kind(),
                submission.id
            )))
        }
    }

    /// Apply the update in place, enforcing the status machine.
    pub fn apply(self, submission: &mut Submission, now: DateTime<Utc>) -> Result<(), GradingError> {
        match self {
            SubmissionUpdate::EditContent {
                content,
                attachments,
            } => {
                if submission.status != SubmissionStatus::Draft {
                    return Err(GradingError::Validation(format!(
                        "submission {} is {} and can no longer be edited",
                        submission.id, submission.status
                    )));
                }
                if let Some(content) = content {
                    submission.content = Some(content);
                }
                if let Some(attachments) = attachments {
                    submission.attachments = attachments;
                }
            }
            SubmissionUpdate::Submit => {
                transition(submission, SubmissionStatus::Submitted)?;
                submission.submitted_at.get_or_insert(now);
            }
            SubmissionUpdate::Grade(grade) => {
                match submission.status {
                    SubmissionStatus::Submitted | SubmissionStatus::AiReviewed => {
                        transition(submission, SubmissionStatus::Graded)?
                    }
                    // Regrading keeps the status.
                    SubmissionStatus::Graded => {}
                    from => {
                        return Err(GradingError::InvalidTransition {
                            from: from.to_string(),
                            to: SubmissionStatus::Graded.to_string(),
                        })
                    }
                }
                submission.rubric_scores = grade.rubric_scores;
                submission.score = Some(grade.score);
                submission.grade = grade.grade;
                submission.feedback = grade.feedback;
                submission.grader_id = Some(grade.grader_id);
                submission.graded_at = Some(now);
            }
            SubmissionUpdate::Release => transition(submission, SubmissionStatus::Released)?,
            SubmissionUpdate::RecordAiReview(review) => {
                if submission.status <= SubmissionStatus::Submitted {
                    transition(submission, SubmissionStatus::AiReviewed)?;
                }
                submission.ai_review = Some(review);
            }
        }
        submission.updated_at = now;
        Ok(())
    }
}

fn transition(submission: &mut Submission, next: SubmissionStatus) -> Result<(), GradingError> {
    if !submission.status.can_advance_to(next) {
        return Err(GradingError::InvalidTransition {
            from: submission.status.to_string(),
            to: next.to_string(),
        });
    }
    submission.status = next;
    Ok(())
}

/// A change to an assignment. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssignmentUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub max_score: Option<f64>,
    #[serde(default)]
    pub rubric: Option<Rubric>,
    #[serde(default)]
    pub ai_assist: Option<bool>,
    /// `Some(None)` makes the assignment public.
    #[serde(default)]
    pub access_control: Option<Option<AccessPolicy>>,
}

impl AssignmentUpdate {
    /// `can_write` says whether the actor holds `write` on the assignment.
    /// Changing the access policy additionally requires ownership or admin.
    pub fn authorize(
        &self,
        actor: &Actor,
        assignment: &Assignment,
        can_write: bool,
    ) -> Result<(), GradingError> {
        if actor.role == Role::Student || !can_write {
            return Err(GradingError::PermissionDenied(format!(
                "{} may not modify assignment {}",
                actor.principal_id, assignment.id
            )));
        }
        let is_owner = assignment.teacher_id == actor.principal_id || actor.role == Role::Admin;
        if self.access_control.is_some() && !is_owner {
            return Err(GradingError::PermissionDenied(format!(
                "only the owner may change access to assignment {}",
                assignment.id
            )));
        }
        Ok(())
    }

    pub fn apply(self, assignment: &mut Assignment, now: DateTime<Utc>) -> Result<(), GradingError> {
        if let Some(max_score) = self.max_score {
            if !max_score.is_finite() || max_score <= 0.0 {
                return Err(GradingError::Validation(format!(
                    "max score must be positive, got {max_score}"
                )));
            }
        }
        if let Some(rubric) = &self.rubric {
            rubric.validate()?;
        }
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(GradingError::Validation("title must not be empty".into()));
            }
        }

        if let Some(title) = self.title {
            assignment.title = title;
        }
        if let Some(description) = self.description {
            assignment.description = Some(description);
        }
        if let Some(due_date) = self.due_date {
            assignment.due_date = Some(due_date);
        }
        if let Some(max_score) = self.max_score {
            assignment.max_score = max_score;
        }
        if let Some(rubric) = self.rubric {
            assignment.rubric = Some(rubric);
        }
        if let Some(ai_assist) = self.ai_assist {
            assignment.ai_assist = ai_assist;
        }
        if let Some(access_control) = self.access_control {
            assignment.access_control = access_control;
        }
        assignment.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Criterion;

    fn submission(status: SubmissionStatus) -> Submission {
        let now = Utc::now();
        Submission {
            id: "s1".into(),
            assignment_id: "a1".into(),
            student_id: "stu".into(),
            content: Some("draft".into()),
            attachments: vec![],
            status,
            submitted_at: None,
            score: None,
            max_score: Some(100.0),
            grade: None,
            feedback: None,
            rubric_scores: BTreeMap::new(),
            grader_id: None,
            graded_at: None,
            ai_review: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn review() -> AiReview {
        AiReview {
            rubric_scores: BTreeMap::from([("a".to_string(), 4.0)]),
            feedback_draft: "[A] good".into(),
            score: 80.0,
            fallback_criteria: vec![],
            scorer: "mock".into(),
            reviewed_at: Utc::now(),
        }
    }

    fn teacher_grade() -> TeacherGrade {
        TeacherGrade {
            rubric_scores: BTreeMap::from([("a".to_string(), 5.0)]),
            score: 100.0,
            grade: Some("A".into()),
            feedback: Some("excellent".into()),
            grader_id: "t1".into(),
        }
    }

    #[test]
    fn students_cannot_issue_grading_updates() {
        let sub = submission(SubmissionStatus::Submitted);
        let student = Actor::student("stu");
        let err = SubmissionUpdate::Grade(teacher_grade())
            .authorize(&student, &sub, false)
            .unwrap_err();
        assert!(matches!(err, GradingError::PermissionDenied(_)));
        assert!(SubmissionUpdate::Submit
            .authorize(&student, &sub, false)
            .is_ok());
        assert!(SubmissionUpdate::Submit
            .authorize(&Actor::student("other"), &sub, false)
            .is_err());
    }

    #[test]
    fn edits_only_while_draft() {
        let mut sub = submission(SubmissionStatus::Submitted);
        let err = SubmissionUpdate::EditContent {
            content: Some("late change".into()),
            attachments: None,
        }
        .apply(&mut sub, Utc::now())
        .unwrap_err();
        assert!(matches!(err, GradingError::Validation(_)));

        let mut sub = submission(SubmissionStatus::Draft);
        SubmissionUpdate::EditContent {
            content: Some("final answer".into()),
            attachments: Some(vec!["essay.pdf".into()]),
        }
        .apply(&mut sub, Utc::now())
        .unwrap();
        assert_eq!(sub.content.as_deref(), Some("final answer"));
        assert_eq!(sub.attachments, vec!["essay.pdf"]);
    }

    #[test]
    fn submit_records_time_once() {
        let mut sub = submission(SubmissionStatus::Draft);
        let now = Utc::now();
        SubmissionUpdate::Submit.apply(&mut sub, now).unwrap();
        assert_eq!(sub.status, SubmissionStatus::Submitted);
        assert_eq!(sub.submitted_at, Some(now));
        assert!(SubmissionUpdate::Submit.apply(&mut sub, Utc::now()).is_err());
    }

    #[test]
    fn ai_review_advances_early_states_only() {
        let mut sub = submission(SubmissionStatus::Submitted);
        SubmissionUpdate::RecordAiReview(review())
            .apply(&mut sub, Utc::now())
            .unwrap();
        assert_eq!(sub.status, SubmissionStatus::AiReviewed);
        assert!(sub.score.is_none());

        let mut sub = submission(SubmissionStatus::Graded);
        sub.score = Some(90.0);
        sub.feedback = Some("teacher words".into());
        SubmissionUpdate::RecordAiReview(review())
            .apply(&mut sub, Utc::now())
            .unwrap();
        assert_eq!(sub.status, SubmissionStatus::Graded);
        assert_eq!(sub.score, Some(90.0));
        assert_eq!(sub.feedback.as_deref(), Some("teacher words"));
        assert!(sub.ai_review.is_some());
    }

    #[test]
    fn grade_then_release() {
        let mut sub = submission(SubmissionStatus::AiReviewed);
        SubmissionUpdate::Grade(teacher_grade())
            .apply(&mut sub, Utc::now())
            .unwrap();
        assert_eq!(sub.status, SubmissionStatus::Graded);
        assert_eq!(sub.grader_id.as_deref(), Some("t1"));
        assert!(sub.graded_at.is_some());

        SubmissionUpdate::Release.apply(&mut sub, Utc::now()).unwrap();
        assert_eq!(sub.status, SubmissionStatus::Released);

        let err = SubmissionUpdate::Grade(teacher_grade())
            .apply(&mut sub, Utc::now())
            .unwrap_err();
        assert!(matches!(err, GradingError::InvalidTransition { .. }));
    }

    #[test]
    fn drafts_cannot_be_graded_or_released() {
        let mut sub = submission(SubmissionStatus::Draft);
        assert!(SubmissionUpdate::Grade(teacher_grade())
            .apply(&mut sub, Utc::now())
            .is_err());
        assert!(SubmissionUpdate::Release.apply(&mut sub, Utc::now()).is_err());
        assert_eq!(sub.status, SubmissionStatus::Draft);
    }

    #[test]
    fn assignment_update_validates_rubric() {
        let now = Utc::now();
        let mut assignment = Assignment {
            id: "a1".into(),
            teacher_id: "t1".into(),
            title: "Essay".into(),
            description: None,
            due_date: None,
            max_score: 100.0,
            rubric: None,
            ai_assist: false,
            access_control: None,
            created_at: now,
            updated_at: now,
        };
        let bad = AssignmentUpdate {
            rubric: Some(Rubric::new(vec![Criterion::new("a", "A", Some(0.3))])),
            ..Default::default()
        };
        assert!(bad.apply(&mut assignment, now).is_err());
        assert!(assignment.rubric.is_none());

        let good = AssignmentUpdate {
            rubric: Some(Rubric::new(vec![Criterion::new("a", "A", Some(1.0))])),
            ai_assist: Some(true),
            ..Default::default()
        };
        good.apply(&mut assignment, now).unwrap();
        assert!(assignment.ai_assist);
        assert!(assignment.rubric.is_some());
    }

    #[test]
    fn access_changes_need_ownership() {
        let now = Utc::now();
        let assignment = Assignment {
            id: "a1".into(),
            teacher_id: "t1".into(),
            title: "Essay".into(),
            description: None,
            due_date: None,
            max_score: 100.0,
            rubric: None,
            ai_assist: false,
            access_control: None,
            created_at: now,
            updated_at: now,
        };
        let update = AssignmentUpdate {
            access_control: Some(None),
            ..Default::default()
        };
        assert!(update
            .authorize(&Actor::teacher("t2"), &assignment, true)
            .is_err());
        assert!(update
            .authorize(&Actor::teacher("t1"), &assignment, true)
            .is_ok());
        assert!(AssignmentUpdate::default()
            .authorize(&Actor::student("t1"), &assignment, true)
            .is_err());
    }
}
