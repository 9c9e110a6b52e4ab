//! Shared types for the command pipeline.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ── Inbound email ───────────────────────────────────────────────────

/// An inbound email as seen by the processor.
///
/// Both ingestion paths (IMAP poller, HTTP endpoint) convert their native
/// format into this struct before handing it to [`super::EmailProcessor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEmail {
    /// Subject line — carries the command verb.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
    /// Sender address, matched against the teacher whitelist.
    pub from_email: String,
    /// Recipient addresses, recorded in the audit log.
    pub to_emails: Vec<String>,
    /// RFC 5322 Message-ID (or equivalent), the idempotency key.
    pub message_id: String,
}

// ── Parsed commands ─────────────────────────────────────────────────

/// A classified email command with its extracted fields.
///
/// Produced by an ordered chain of matchers in [`super::parser`]; the
/// priority order is ASSIGNMENT, SUBMISSION, GRADE, RETURN. An email that
/// matches none of them is not a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// ASSIGN — a teacher creates an assignment.
    Assignment(AssignmentDraft),
    /// SUBMIT <code> — a student submits work.
    Submission {
        assignment_code: String,
        student_id: String,
    },
    /// GRADE <code> <student> — a teacher records a grade.
    Grade(GradeSlip),
    /// RETURN <code> <student> — legacy alias of GRADE. Parsed the same
    /// except the `grade` body key is optional, and processed without a
    /// teacher-whitelist check.
    Return(GradeSlip),
}

/// Fields extracted from a valid ASSIGN email.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentDraft {
    /// Derived code: class token (spaces removed, upper-cased, max 8
    /// chars) + "-" + deadline MMDD.
    pub code: String,
    pub title: String,
    pub class_name: String,
    pub deadline_at: NaiveDateTime,
    pub instructions: String,
    pub rubric: String,
}

/// Fields extracted from a GRADE or RETURN email.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeSlip {
    pub assignment_code: String,
    pub student_id: String,
    pub grade_value: String,
    pub feedback_text: String,
}

// ── Processing outcome ──────────────────────────────────────────────

/// Business outcome of processing one email.
///
/// Every terminal branch of the processor produces exactly one of these.
/// None of them is an error — "not found" and "unauthorized" are ordinary
/// results reported back to the sender as text.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    AssignmentCreated { code: String },
    SubmissionReceived { submission_id: String, on_time: bool },
    GradeRecorded { grade_id: String },
    TeacherNotWhitelisted,
    ClassNotFound,
    AssignmentNotFound,
    StudentNotFound,
    StudentNotEnrolled,
    DuplicateSubmission,
    NoSubmissionFound,
    UnknownCommand,
    /// The message id was already in the audit log; nothing was done.
    AlreadyProcessed,
}

impl Outcome {
    /// Audit-log code written to `email_messages.parse_result`.
    pub fn code(&self) -> String {
        match self {
            Self::AssignmentCreated { code } => format!("ASSIGNMENT_CREATED:{code}"),
            Self::SubmissionReceived { submission_id, .. } => {
                format!("SUBMISSION_RECEIVED:{submission_id}")
            }
            Self::GradeRecorded { grade_id } => format!("GRADE_RECEIVED:{grade_id}"),
            Self::TeacherNotWhitelisted => "TEACHER_NOT_WHITELISTED".into(),
            Self::ClassNotFound => "CLASS_NOT_FOUND".into(),
            Self::AssignmentNotFound => "ASSIGNMENT_NOT_FOUND".into(),
            Self::StudentNotFound => "STUDENT_NOT_FOUND".into(),
            Self::StudentNotEnrolled => "STUDENT_NOT_ENROLLED".into(),
            Self::DuplicateSubmission => "DUPLICATE_SUBMISSION".into(),
            Self::NoSubmissionFound => "NO_SUBMISSION_FOUND".into(),
            Self::UnknownCommand => "UNKNOWN_COMMAND".into(),
            Self::AlreadyProcessed => "ALREADY_PROCESSED".into(),
        }
    }

    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::AssignmentCreated { .. } => "assignment_created",
            Self::SubmissionReceived { .. } => "submission_received",
            Self::GradeRecorded { .. } => "grade_recorded",
            Self::TeacherNotWhitelisted => "teacher_not_whitelisted",
            Self::ClassNotFound => "class_not_found",
            Self::AssignmentNotFound => "assignment_not_found",
            Self::StudentNotFound => "student_not_found",
            Self::StudentNotEnrolled => "student_not_enrolled",
            Self::DuplicateSubmission => "duplicate_submission",
            Self::NoSubmissionFound => "no_submission_found",
            Self::UnknownCommand => "unknown_command",
            Self::AlreadyProcessed => "already_processed",
        }
    }

    /// Whether the command achieved its mutation.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::AssignmentCreated { .. }
                | Self::SubmissionReceived { .. }
                | Self::GradeRecorded { .. }
        )
    }
}

/// Result of processing one email: the reply text for the sender plus
/// the business outcome behind it.
#[derive(Debug, Clone)]
pub struct ProcessReply {
    pub response: String,
    pub outcome: Outcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_codes() {
        assert_eq!(
            Outcome::AssignmentCreated { code: "MATH7-0120".into() }.code(),
            "ASSIGNMENT_CREATED:MATH7-0120"
        );
        assert_eq!(Outcome::DuplicateSubmission.code(), "DUPLICATE_SUBMISSION");
        assert_eq!(Outcome::UnknownCommand.code(), "UNKNOWN_COMMAND");
    }

    #[test]
    fn outcome_success_flags() {
        assert!(Outcome::GradeRecorded { grade_id: "g1".into() }.is_success());
        assert!(
            Outcome::SubmissionReceived { submission_id: "s1".into(), on_time: true }
                .is_success()
        );
        assert!(!Outcome::TeacherNotWhitelisted.is_success());
        assert!(!Outcome::AlreadyProcessed.is_success());
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(Outcome::NoSubmissionFound.label(), "no_submission_found");
        assert_eq!(
            Outcome::SubmissionReceived { submission_id: "x".into(), on_time: false }.label(),
            "submission_received"
        );
    }
}
