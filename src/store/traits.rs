//! Unified `Database` trait — single async interface for all persistence.
//!
//! Covers the directory lookups the processor consumes (teacher, class,
//! student, enrollment), entity inserts, the audit log, and the inbound
//! queue filled by the email poller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::models::{
    Assignment, ClassSection, EmailMessage, Enrollment, Grade, Student, Submission, Teacher,
};

/// Status of a queued inbound email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundStatus {
    /// Waiting for the processor loop.
    Pending,
    /// Ran through the pipeline; a reply was produced.
    Processed,
}

/// An inbound email persisted by the poller, awaiting processing.
#[derive(Debug, Clone)]
pub struct StoredInbound {
    pub id: String,
    pub message_id: String,
    pub sender: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
    pub status: InboundStatus,
}

/// Backend-agnostic database trait.
#[async_trait]
pub trait Database: Send + Sync {
    // ── Directory lookups ───────────────────────────────────────────

    /// Resolve a teacher by email address (the authorization key).
    async fn teacher_by_email(&self, email: &str) -> Result<Option<Teacher>, DatabaseError>;

    /// Resolve a class section by its name.
    async fn class_by_name(&self, name: &str) -> Result<Option<ClassSection>, DatabaseError>;

    /// Resolve a student by their external student id.
    async fn student_by_id(&self, student_id: &str) -> Result<Option<Student>, DatabaseError>;

    /// Whether the student has an active enrollment in the class.
    async fn is_enrolled(&self, student_id: &str, class_id: &str) -> Result<bool, DatabaseError>;

    // ── Assignments / submissions / grades ──────────────────────────

    async fn insert_assignment(&self, assignment: &Assignment) -> Result<(), DatabaseError>;

    async fn find_assignment_by_code(
        &self,
        code: &str,
    ) -> Result<Option<Assignment>, DatabaseError>;

    /// All assignments, most recently created first.
    async fn list_assignments(&self) -> Result<Vec<Assignment>, DatabaseError>;

    /// Insert a submission. A `(assignment_id, student_id)` uniqueness
    /// constraint backs the processor's duplicate check; violations
    /// surface as [`DatabaseError::Constraint`].
    async fn insert_submission(&self, submission: &Submission) -> Result<(), DatabaseError>;

    /// The submission for a given (assignment, student) pair, if any.
    async fn submission_for(
        &self,
        assignment_id: &str,
        student_id: &str,
    ) -> Result<Option<Submission>, DatabaseError>;

    /// All submissions for an assignment.
    async fn submissions_by_assignment(
        &self,
        assignment_id: &str,
    ) -> Result<Vec<Submission>, DatabaseError>;

    async fn insert_grade(&self, grade: &Grade) -> Result<(), DatabaseError>;

    // ── Audit log ───────────────────────────────────────────────────

    /// Write the audit record for one processed message.
    async fn record_email(&self, email: &EmailMessage) -> Result<(), DatabaseError>;

    /// Look up an audit record by message id (idempotency check).
    async fn email_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<EmailMessage>, DatabaseError>;

    // ── Directory seeding (admin) ───────────────────────────────────

    async fn insert_teacher(&self, teacher: &Teacher) -> Result<(), DatabaseError>;
    async fn insert_student(&self, student: &Student) -> Result<(), DatabaseError>;
    async fn insert_class(&self, class: &ClassSection) -> Result<(), DatabaseError>;
    async fn insert_enrollment(&self, enrollment: &Enrollment) -> Result<(), DatabaseError>;

    // ── Inbound queue ───────────────────────────────────────────────

    /// Queue an inbound email fetched by the poller. Returns the row id.
    async fn insert_inbound(
        &self,
        message_id: &str,
        sender: &str,
        recipients: &[String],
        subject: &str,
        body: &str,
        received_at: DateTime<Utc>,
    ) -> Result<String, DatabaseError>;

    /// Look up a queued email by message id (poller dedup).
    async fn inbound_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<StoredInbound>, DatabaseError>;

    /// All pending inbound emails, oldest first.
    async fn pending_inbound(&self) -> Result<Vec<StoredInbound>, DatabaseError>;

    /// Update a queued email's status.
    async fn update_inbound_status(
        &self,
        id: &str,
        status: InboundStatus,
    ) -> Result<(), DatabaseError>;
}
