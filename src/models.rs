//! Domain entities persisted in the relational store.
//!
//! Deadlines are naive wall-clock values carrying a timezone label
//! (`deadline_tz`, always "CT" today). Audit and creation timestamps
//! are UTC.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// A teacher. The email is the sole authorization key: a sender is
/// "whitelisted" iff a teacher row matches their address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Teacher {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub status: String,
}

/// A class section. `name` is the lookup key the ASSIGN command resolves
/// against, so it must be unique enough to match unambiguously.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassSection {
    pub id: String,
    pub term_id: Option<String>,
    pub name: String,
    pub subject: Option<String>,
    pub teacher_id: String,
    pub status: String,
}

/// A student. `student_id` is the external identifier students put in
/// SUBMIT bodies; it is distinct from the row id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub status: String,
}

/// Links a student (by external student id) to a class section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: String,
    pub class_id: String,
    pub student_id: String,
    pub active: bool,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
}

/// An assignment created by an ASSIGN command.
///
/// `code` is derived at creation (class token + deadline MMDD) and never
/// changes. `grace_days` is stored but does not affect the on-time flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: String,
    pub code: String,
    pub class_id: String,
    pub title: String,
    pub instructions: String,
    pub rubric: String,
    pub deadline_at: NaiveDateTime,
    pub deadline_tz: String,
    pub created_by_teacher_id: String,
    pub status: String,
    pub grace_days: i64,
    pub created_at: DateTime<Utc>,
}

/// A student's submission. At most one per (assignment, student); the
/// `on_time` flag is computed once at creation and never recomputed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub assignment_id: String,
    pub student_id: String,
    pub received_at: DateTime<Utc>,
    pub on_time: bool,
    pub status: String,
}

/// A grade recorded by a GRADE or RETURN command. Only created when a
/// matching submission exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grade {
    pub id: String,
    pub assignment_id: String,
    pub student_id: String,
    pub grade_value: String,
    pub feedback_text: String,
    pub graded_at: DateTime<Utc>,
}

/// Audit record written exactly once per processed message.
///
/// `message_id` is unique and doubles as the idempotency key against
/// reprocessing the same email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    pub id: String,
    pub direction: String,
    pub from_email: String,
    pub to_emails: Vec<String>,
    pub subject: String,
    pub message_id: String,
    pub processed_at: DateTime<Utc>,
    pub parse_result: Option<String>,
}
