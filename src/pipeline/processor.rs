//! Email command processor — parse, authorize, validate, mutate, audit.
//!
//! One linear decision tree per inbound message. Every terminal branch
//! writes exactly one audit record and returns exactly one response
//! string; business failures (unknown teacher, duplicate submission, ...)
//! are ordinary [`Outcome`]s, never errors. Only genuine storage failures
//! propagate to the caller.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{NaiveDateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::models::{Assignment, ClassSection, EmailMessage, Grade, Submission, Teacher};
use crate::pipeline::parser;
use crate::pipeline::types::{
    AssignmentDraft, Command, GradeSlip, InboundEmail, Outcome, ProcessReply,
};
use crate::store::Database;

/// Grace period, in days, given to every new assignment. Stored on the
/// row but intentionally not consulted for the on-time flag.
const DEFAULT_GRACE_DAYS: i64 = 7;

/// Timezone label attached to every deadline.
const DEADLINE_TZ: &str = "CT";

/// Inclusive on-time check: a submission at exactly the deadline counts.
/// The stored grace period never widens this window.
fn is_on_time(now: NaiveDateTime, deadline: NaiveDateTime) -> bool {
    now <= deadline
}

/// Per-instance cache for directory lookups.
///
/// Only positive hits are cached; a miss always goes back to the store,
/// so re-fetching is always a safe substitute. The cache lives and dies
/// with its processor instance — it is never shared across processes and
/// carries no freshness guarantee.
pub struct DirectoryCache {
    teachers: Mutex<HashMap<String, Teacher>>,
    classes: Mutex<HashMap<String, ClassSection>>,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self {
            teachers: Mutex::new(HashMap::new()),
            classes: Mutex::new(HashMap::new()),
        }
    }

    async fn teacher_by_email(
        &self,
        db: &dyn Database,
        email: &str,
    ) -> Result<Option<Teacher>, DatabaseError> {
        if let Some(teacher) = self.teachers.lock().unwrap().get(email) {
            return Ok(Some(teacher.clone()));
        }
        let teacher = db.teacher_by_email(email).await?;
        if let Some(ref t) = teacher {
            self.teachers
                .lock()
                .unwrap()
                .insert(email.to_string(), t.clone());
        }
        Ok(teacher)
    }

    async fn class_by_name(
        &self,
        db: &dyn Database,
        name: &str,
    ) -> Result<Option<ClassSection>, DatabaseError> {
        if let Some(class) = self.classes.lock().unwrap().get(name) {
            return Ok(Some(class.clone()));
        }
        let class = db.class_by_name(name).await?;
        if let Some(ref c) = class {
            self.classes
                .lock()
                .unwrap()
                .insert(name.to_string(), c.clone());
        }
        Ok(class)
    }
}

impl Default for DirectoryCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Processes inbound command emails against the store.
pub struct EmailProcessor {
    db: Arc<dyn Database>,
    directory: DirectoryCache,
}

impl EmailProcessor {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            db,
            directory: DirectoryCache::new(),
        }
    }

    /// Process one inbound email end to end.
    ///
    /// Classifies the message, runs the per-command validation pipeline,
    /// writes the audit record, and returns the reply text. A message id
    /// already present in the audit log short-circuits without a second
    /// write.
    pub async fn process(&self, email: &InboundEmail) -> Result<ProcessReply, DatabaseError> {
        if self
            .db
            .email_by_message_id(&email.message_id)
            .await?
            .is_some()
        {
            info!(message_id = %email.message_id, "Message already processed, skipping");
            return Ok(ProcessReply {
                response: "This message was already processed.".to_string(),
                outcome: Outcome::AlreadyProcessed,
            });
        }

        let (response, outcome) = match parser::classify(&email.subject, &email.body) {
            Some(Command::Assignment(draft)) => self.handle_assignment(&draft, email).await?,
            Some(Command::Submission {
                assignment_code,
                student_id,
            }) => {
                self.handle_submission(&assignment_code, &student_id)
                    .await?
            }
            Some(Command::Grade(slip)) => self.handle_grade(&slip, email, true).await?,
            Some(Command::Return(slip)) => self.handle_grade(&slip, email, false).await?,
            None => (
                "Unknown command. Please use ASSIGN, SUBMIT, GRADE, or RETURN format.".to_string(),
                Outcome::UnknownCommand,
            ),
        };

        // The unique message_id on the audit table backs the idempotency
        // check above: a concurrent duplicate of the same message loses
        // here and gets the same reply as a replay.
        match self.audit(email, &outcome).await {
            Ok(()) => {}
            Err(DatabaseError::Constraint(_)) => {
                warn!(
                    message_id = %email.message_id,
                    "Concurrent duplicate message caught by audit constraint"
                );
                return Ok(ProcessReply {
                    response: "This message was already processed.".to_string(),
                    outcome: Outcome::AlreadyProcessed,
                });
            }
            Err(e) => return Err(e),
        }

        info!(
            message_id = %email.message_id,
            sender = %email.from_email,
            outcome = outcome.label(),
            "Email processed"
        );

        Ok(ProcessReply { response, outcome })
    }

    /// ASSIGN: whitelist the sender, resolve the class, create the
    /// assignment.
    async fn handle_assignment(
        &self,
        draft: &AssignmentDraft,
        email: &InboundEmail,
    ) -> Result<(String, Outcome), DatabaseError> {
        let Some(teacher) = self
            .directory
            .teacher_by_email(self.db.as_ref(), &email.from_email)
            .await?
        else {
            return Ok((
                format!(
                    "Sender {} is not an authorized teacher. Contact admin to be whitelisted.",
                    email.from_email
                ),
                Outcome::TeacherNotWhitelisted,
            ));
        };

        let Some(class) = self
            .directory
            .class_by_name(self.db.as_ref(), &draft.class_name)
            .await?
        else {
            return Ok((
                format!("Class '{}' not found.", draft.class_name),
                Outcome::ClassNotFound,
            ));
        };

        let assignment = Assignment {
            id: Uuid::new_v4().to_string(),
            code: draft.code.clone(),
            class_id: class.id,
            title: draft.title.clone(),
            instructions: draft.instructions.clone(),
            rubric: draft.rubric.clone(),
            deadline_at: draft.deadline_at,
            deadline_tz: DEADLINE_TZ.to_string(),
            created_by_teacher_id: teacher.id,
            status: "SCHEDULED".to_string(),
            grace_days: DEFAULT_GRACE_DAYS,
            created_at: Utc::now(),
        };
        self.db.insert_assignment(&assignment).await?;

        Ok((
            format!(
                "Assignment '{}' created with code {}. Deadline: {} {}.",
                assignment.title,
                assignment.code,
                assignment.deadline_at.format("%Y-%m-%d %H:%M"),
                assignment.deadline_tz,
            ),
            Outcome::AssignmentCreated {
                code: assignment.code,
            },
        ))
    }

    /// SUBMIT: resolve assignment and student, check enrollment and
    /// duplicates, store the submission with its on-time flag.
    async fn handle_submission(
        &self,
        assignment_code: &str,
        student_id: &str,
    ) -> Result<(String, Outcome), DatabaseError> {
        let Some(assignment) = self.db.find_assignment_by_code(assignment_code).await? else {
            return Ok((
                format!("Assignment {assignment_code} not found."),
                Outcome::AssignmentNotFound,
            ));
        };

        if self.db.student_by_id(student_id).await?.is_none() {
            return Ok((
                format!("Student {student_id} not found."),
                Outcome::StudentNotFound,
            ));
        }

        if !self
            .db
            .is_enrolled(student_id, &assignment.class_id)
            .await?
        {
            return Ok((
                format!("Student {student_id} is not enrolled in this class."),
                Outcome::StudentNotEnrolled,
            ));
        }

        if self
            .db
            .submission_for(&assignment.id, student_id)
            .await?
            .is_some()
        {
            return Ok((
                "Submission already received. Contact admin to request changes.".to_string(),
                Outcome::DuplicateSubmission,
            ));
        }

        let now = Utc::now();
        let on_time = is_on_time(now.naive_utc(), assignment.deadline_at);

        let submission = Submission {
            id: Uuid::new_v4().to_string(),
            assignment_id: assignment.id.clone(),
            student_id: student_id.to_string(),
            received_at: now,
            on_time,
            status: "RECEIVED".to_string(),
        };

        // The unique (assignment_id, student_id) constraint backs the
        // existence check above: a concurrent double-submit loses here.
        match self.db.insert_submission(&submission).await {
            Ok(()) => {}
            Err(DatabaseError::Constraint(_)) => {
                warn!(
                    assignment_code = assignment_code,
                    student_id = student_id,
                    "Concurrent duplicate submission caught by constraint"
                );
                return Ok((
                    "Submission already received. Contact admin to request changes.".to_string(),
                    Outcome::DuplicateSubmission,
                ));
            }
            Err(e) => return Err(e),
        }

        let status = if on_time { "on time" } else { "late" };
        Ok((
            format!("Submission received {status} for {assignment_code} (Student {student_id})."),
            Outcome::SubmissionReceived {
                submission_id: submission.id,
                on_time,
            },
        ))
    }

    /// GRADE and RETURN: record a grade against an existing submission.
    ///
    /// GRADE requires a whitelisted teacher sender; RETURN is the legacy
    /// verb and historically skipped that check. The asymmetry is
    /// preserved for legacy clients.
    async fn handle_grade(
        &self,
        slip: &GradeSlip,
        email: &InboundEmail,
        require_teacher: bool,
    ) -> Result<(String, Outcome), DatabaseError> {
        if require_teacher
            && self
                .directory
                .teacher_by_email(self.db.as_ref(), &email.from_email)
                .await?
                .is_none()
        {
            return Ok((
                format!(
                    "Sender {} is not an authorized teacher. Contact admin to be whitelisted.",
                    email.from_email
                ),
                Outcome::TeacherNotWhitelisted,
            ));
        }

        let Some(assignment) = self
            .db
            .find_assignment_by_code(&slip.assignment_code)
            .await?
        else {
            return Ok((
                format!("Assignment {} not found.", slip.assignment_code),
                Outcome::AssignmentNotFound,
            ));
        };

        if self
            .db
            .submission_for(&assignment.id, &slip.student_id)
            .await?
            .is_none()
        {
            return Ok((
                format!(
                    "No submission found for student {} on assignment {}.",
                    slip.student_id, slip.assignment_code
                ),
                Outcome::NoSubmissionFound,
            ));
        }

        let grade = Grade {
            id: Uuid::new_v4().to_string(),
            assignment_id: assignment.id,
            student_id: slip.student_id.clone(),
            grade_value: slip.grade_value.clone(),
            feedback_text: slip.feedback_text.clone(),
            graded_at: Utc::now(),
        };
        self.db.insert_grade(&grade).await?;

        Ok((
            format!(
                "Grade recorded for student {} on assignment {}: {}",
                grade.student_id, slip.assignment_code, grade.grade_value
            ),
            Outcome::GradeRecorded { grade_id: grade.id },
        ))
    }

    /// Write the single audit record for this message.
    async fn audit(&self, email: &InboundEmail, outcome: &Outcome) -> Result<(), DatabaseError> {
        self.db
            .record_email(&EmailMessage {
                id: Uuid::new_v4().to_string(),
                direction: "IN".to_string(),
                from_email: email.from_email.clone(),
                to_emails: email.to_emails.clone(),
                subject: email.subject.clone(),
                message_id: email.message_id.clone(),
                processed_at: Utc::now(),
                parse_result: Some(outcome.code()),
            })
            .await
    }
}
