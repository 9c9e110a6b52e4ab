//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. Timestamps are stored as
//! RFC 3339 text; assignment deadlines as naive `YYYY-MM-DD HH:MM:SS`
//! wall-clock text (the tz label lives in its own column).

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::models::{
    Assignment, ClassSection, EmailMessage, Enrollment, Grade, Student, Submission, Teacher,
};
use crate::store::migrations;
use crate::store::traits::{Database, InboundStatus, StoredInbound};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to open database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        info!(path = %path.display(), "Database opened");
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 string into DateTime<Utc>.
fn parse_utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Parse a stored naive deadline (`YYYY-MM-DD HH:MM:SS`).
fn parse_naive(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap_or(NaiveDateTime::MIN)
}

fn naive_to_str(dt: &NaiveDateTime) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Decode a JSON-encoded string list column.
fn parse_string_list(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}

fn encode_string_list(list: &[String]) -> Result<String, DatabaseError> {
    serde_json::to_string(list).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

/// Map a libsql error, detecting UNIQUE violations.
fn map_insert_err(op: &str, e: libsql::Error) -> DatabaseError {
    let msg = e.to_string();
    if msg.contains("UNIQUE constraint failed") {
        DatabaseError::Constraint(format!("{op}: {msg}"))
    } else {
        DatabaseError::Query(format!("{op}: {msg}"))
    }
}

const ASSIGNMENT_COLUMNS: &str = "id, code, class_id, title, instructions, rubric, deadline_at, \
     deadline_tz, created_by_teacher_id, status, grace_days, created_at";

fn row_to_assignment(row: &libsql::Row) -> Result<Assignment, libsql::Error> {
    let deadline_str: String = row.get(6)?;
    let created_str: String = row.get(11)?;
    Ok(Assignment {
        id: row.get(0)?,
        code: row.get(1)?,
        class_id: row.get(2)?,
        title: row.get(3)?,
        instructions: row.get(4)?,
        rubric: row.get(5)?,
        deadline_at: parse_naive(&deadline_str),
        deadline_tz: row.get(7)?,
        created_by_teacher_id: row.get(8)?,
        status: row.get(9)?,
        grace_days: row.get(10)?,
        created_at: parse_utc(&created_str),
    })
}

const SUBMISSION_COLUMNS: &str = "id, assignment_id, student_id, received_at, on_time, status";

fn row_to_submission(row: &libsql::Row) -> Result<Submission, libsql::Error> {
    let received_str: String = row.get(3)?;
    let on_time: i64 = row.get(4)?;
    Ok(Submission {
        id: row.get(0)?,
        assignment_id: row.get(1)?,
        student_id: row.get(2)?,
        received_at: parse_utc(&received_str),
        on_time: on_time != 0,
        status: row.get(5)?,
    })
}

const INBOUND_COLUMNS: &str =
    "id, message_id, sender, recipients, subject, body, received_at, status";

fn row_to_inbound(row: &libsql::Row) -> Result<StoredInbound, libsql::Error> {
    let recipients_str: String = row.get(3)?;
    let received_str: String = row.get(6)?;
    let status_str: String = row.get(7)?;
    Ok(StoredInbound {
        id: row.get(0)?,
        message_id: row.get(1)?,
        sender: row.get(2)?,
        recipients: parse_string_list(&recipients_str),
        subject: row.get(4)?,
        body: row.get(5)?,
        received_at: parse_utc(&received_str),
        status: match status_str.as_str() {
            "processed" => InboundStatus::Processed,
            _ => InboundStatus::Pending,
        },
    })
}

#[async_trait]
impl Database for LibSqlBackend {
    // ── Directory lookups ───────────────────────────────────────────

    async fn teacher_by_email(&self, email: &str) -> Result<Option<Teacher>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, email, first_name, last_name, status FROM teachers WHERE email = ?1",
                params![email],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("teacher_by_email: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(Teacher {
                id: row.get(0).map_err(|e| DatabaseError::Query(e.to_string()))?,
                email: row.get(1).map_err(|e| DatabaseError::Query(e.to_string()))?,
                first_name: row.get(2).map_err(|e| DatabaseError::Query(e.to_string()))?,
                last_name: row.get(3).map_err(|e| DatabaseError::Query(e.to_string()))?,
                status: row.get(4).map_err(|e| DatabaseError::Query(e.to_string()))?,
            })),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("teacher_by_email: {e}"))),
        }
    }

    async fn class_by_name(&self, name: &str) -> Result<Option<ClassSection>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, term_id, name, subject, teacher_id, status FROM classes WHERE name = ?1",
                params![name],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("class_by_name: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(ClassSection {
                id: row.get(0).map_err(|e| DatabaseError::Query(e.to_string()))?,
                term_id: row.get(1).ok(),
                name: row.get(2).map_err(|e| DatabaseError::Query(e.to_string()))?,
                subject: row.get(3).ok(),
                teacher_id: row.get(4).map_err(|e| DatabaseError::Query(e.to_string()))?,
                status: row.get(5).map_err(|e| DatabaseError::Query(e.to_string()))?,
            })),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("class_by_name: {e}"))),
        }
    }

    async fn student_by_id(&self, student_id: &str) -> Result<Option<Student>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, student_id, first_name, last_name, email, status \
                 FROM students WHERE student_id = ?1",
                params![student_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("student_by_id: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(Student {
                id: row.get(0).map_err(|e| DatabaseError::Query(e.to_string()))?,
                student_id: row.get(1).map_err(|e| DatabaseError::Query(e.to_string()))?,
                first_name: row.get(2).map_err(|e| DatabaseError::Query(e.to_string()))?,
                last_name: row.get(3).map_err(|e| DatabaseError::Query(e.to_string()))?,
                email: row.get(4).ok(),
                status: row.get(5).map_err(|e| DatabaseError::Query(e.to_string()))?,
            })),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("student_by_id: {e}"))),
        }
    }

    async fn is_enrolled(&self, student_id: &str, class_id: &str) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM enrollments \
                 WHERE student_id = ?1 AND class_id = ?2 AND active = 1",
                params![student_id, class_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("is_enrolled: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row.get(0).map_err(|e| DatabaseError::Query(e.to_string()))?;
                Ok(count > 0)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(DatabaseError::Query(format!("is_enrolled: {e}"))),
        }
    }

    // ── Assignments / submissions / grades ──────────────────────────

    async fn insert_assignment(&self, assignment: &Assignment) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO assignments (id, code, class_id, title, instructions, rubric, \
                 deadline_at, deadline_tz, created_by_teacher_id, status, grace_days, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    assignment.id.as_str(),
                    assignment.code.as_str(),
                    assignment.class_id.as_str(),
                    assignment.title.as_str(),
                    assignment.instructions.as_str(),
                    assignment.rubric.as_str(),
                    naive_to_str(&assignment.deadline_at),
                    assignment.deadline_tz.as_str(),
                    assignment.created_by_teacher_id.as_str(),
                    assignment.status.as_str(),
                    assignment.grace_days,
                    assignment.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| map_insert_err("insert_assignment", e))?;

        debug!(code = %assignment.code, "Assignment inserted");
        Ok(())
    }

    async fn find_assignment_by_code(
        &self,
        code: &str,
    ) -> Result<Option<Assignment>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE code = ?1"),
                params![code],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_assignment_by_code: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let assignment = row_to_assignment(&row)
                    .map_err(|e| DatabaseError::Query(format!("assignment row parse: {e}")))?;
                Ok(Some(assignment))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("find_assignment_by_code: {e}"))),
        }
    }

    async fn list_assignments(&self) -> Result<Vec<Assignment>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ASSIGNMENT_COLUMNS} FROM assignments ORDER BY created_at DESC"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_assignments: {e}")))?;

        let mut assignments = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_assignment(&row) {
                Ok(a) => assignments.push(a),
                Err(e) => debug!("Skipping unparseable assignment row: {e}"),
            }
        }
        Ok(assignments)
    }

    async fn insert_submission(&self, submission: &Submission) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO submissions (id, assignment_id, student_id, received_at, on_time, status) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    submission.id.as_str(),
                    submission.assignment_id.as_str(),
                    submission.student_id.as_str(),
                    submission.received_at.to_rfc3339(),
                    submission.on_time as i64,
                    submission.status.as_str(),
                ],
            )
            .await
            .map_err(|e| map_insert_err("insert_submission", e))?;

        debug!(
            assignment_id = %submission.assignment_id,
            student_id = %submission.student_id,
            "Submission inserted"
        );
        Ok(())
    }

    async fn submission_for(
        &self,
        assignment_id: &str,
        student_id: &str,
    ) -> Result<Option<Submission>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {SUBMISSION_COLUMNS} FROM submissions \
                     WHERE assignment_id = ?1 AND student_id = ?2"
                ),
                params![assignment_id, student_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("submission_for: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let submission = row_to_submission(&row)
                    .map_err(|e| DatabaseError::Query(format!("submission row parse: {e}")))?;
                Ok(Some(submission))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("submission_for: {e}"))),
        }
    }

    async fn submissions_by_assignment(
        &self,
        assignment_id: &str,
    ) -> Result<Vec<Submission>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {SUBMISSION_COLUMNS} FROM submissions \
                     WHERE assignment_id = ?1 ORDER BY received_at ASC"
                ),
                params![assignment_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("submissions_by_assignment: {e}")))?;

        let mut submissions = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_submission(&row) {
                Ok(s) => submissions.push(s),
                Err(e) => debug!("Skipping unparseable submission row: {e}"),
            }
        }
        Ok(submissions)
    }

    async fn insert_grade(&self, grade: &Grade) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO grades (id, assignment_id, student_id, grade_value, feedback_text, graded_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    grade.id.as_str(),
                    grade.assignment_id.as_str(),
                    grade.student_id.as_str(),
                    grade.grade_value.as_str(),
                    grade.feedback_text.as_str(),
                    grade.graded_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| map_insert_err("insert_grade", e))?;

        debug!(
            assignment_id = %grade.assignment_id,
            student_id = %grade.student_id,
            "Grade inserted"
        );
        Ok(())
    }

    // ── Audit log ───────────────────────────────────────────────────

    async fn record_email(&self, email: &EmailMessage) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO email_messages (id, direction, from_email, to_emails, subject, \
                 message_id, processed_at, parse_result) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    email.id.as_str(),
                    email.direction.as_str(),
                    email.from_email.as_str(),
                    encode_string_list(&email.to_emails)?,
                    email.subject.as_str(),
                    email.message_id.as_str(),
                    email.processed_at.to_rfc3339(),
                    email.parse_result.as_deref(),
                ],
            )
            .await
            .map_err(|e| map_insert_err("record_email", e))?;
        Ok(())
    }

    async fn email_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<EmailMessage>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, direction, from_email, to_emails, subject, message_id, \
                 processed_at, parse_result FROM email_messages WHERE message_id = ?1",
                params![message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("email_by_message_id: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let to_emails_str: String =
                    row.get(3).map_err(|e| DatabaseError::Query(e.to_string()))?;
                let processed_str: String =
                    row.get(6).map_err(|e| DatabaseError::Query(e.to_string()))?;
                Ok(Some(EmailMessage {
                    id: row.get(0).map_err(|e| DatabaseError::Query(e.to_string()))?,
                    direction: row.get(1).map_err(|e| DatabaseError::Query(e.to_string()))?,
                    from_email: row.get(2).map_err(|e| DatabaseError::Query(e.to_string()))?,
                    to_emails: parse_string_list(&to_emails_str),
                    subject: row.get(4).map_err(|e| DatabaseError::Query(e.to_string()))?,
                    message_id: row.get(5).map_err(|e| DatabaseError::Query(e.to_string()))?,
                    processed_at: parse_utc(&processed_str),
                    parse_result: row.get(7).ok(),
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("email_by_message_id: {e}"))),
        }
    }

    // ── Directory seeding ───────────────────────────────────────────

    async fn insert_teacher(&self, teacher: &Teacher) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO teachers (id, email, first_name, last_name, status) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    teacher.id.as_str(),
                    teacher.email.as_str(),
                    teacher.first_name.as_str(),
                    teacher.last_name.as_str(),
                    teacher.status.as_str(),
                ],
            )
            .await
            .map_err(|e| map_insert_err("insert_teacher", e))?;
        Ok(())
    }

    async fn insert_student(&self, student: &Student) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO students (id, student_id, first_name, last_name, email, status) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    student.id.as_str(),
                    student.student_id.as_str(),
                    student.first_name.as_str(),
                    student.last_name.as_str(),
                    student.email.as_deref(),
                    student.status.as_str(),
                ],
            )
            .await
            .map_err(|e| map_insert_err("insert_student", e))?;
        Ok(())
    }

    async fn insert_class(&self, class: &ClassSection) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO classes (id, term_id, name, subject, teacher_id, status) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    class.id.as_str(),
                    class.term_id.as_deref(),
                    class.name.as_str(),
                    class.subject.as_deref(),
                    class.teacher_id.as_str(),
                    class.status.as_str(),
                ],
            )
            .await
            .map_err(|e| map_insert_err("insert_class", e))?;
        Ok(())
    }

    async fn insert_enrollment(&self, enrollment: &Enrollment) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO enrollments (id, class_id, student_id, active, joined_at, left_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    enrollment.id.as_str(),
                    enrollment.class_id.as_str(),
                    enrollment.student_id.as_str(),
                    enrollment.active as i64,
                    enrollment.joined_at.to_rfc3339(),
                    enrollment.left_at.map(|t| t.to_rfc3339()),
                ],
            )
            .await
            .map_err(|e| map_insert_err("insert_enrollment", e))?;
        Ok(())
    }

    // ── Inbound queue ───────────────────────────────────────────────

    async fn insert_inbound(
        &self,
        message_id: &str,
        sender: &str,
        recipients: &[String],
        subject: &str,
        body: &str,
        received_at: DateTime<Utc>,
    ) -> Result<String, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        self.conn()
            .execute(
                "INSERT INTO inbound_messages (id, message_id, sender, recipients, subject, \
                 body, received_at, status, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8)",
                params![
                    id.as_str(),
                    message_id,
                    sender,
                    encode_string_list(recipients)?,
                    subject,
                    body,
                    received_at.to_rfc3339(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| map_insert_err("insert_inbound", e))?;

        debug!(id = %id, message_id = message_id, "Inbound email queued");
        Ok(id)
    }

    async fn inbound_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<StoredInbound>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {INBOUND_COLUMNS} FROM inbound_messages WHERE message_id = ?1"),
                params![message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("inbound_by_message_id: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let inbound = row_to_inbound(&row)
                    .map_err(|e| DatabaseError::Query(format!("inbound row parse: {e}")))?;
                Ok(Some(inbound))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("inbound_by_message_id: {e}"))),
        }
    }

    async fn pending_inbound(&self) -> Result<Vec<StoredInbound>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {INBOUND_COLUMNS} FROM inbound_messages \
                     WHERE status = 'pending' ORDER BY received_at ASC"
                ),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("pending_inbound: {e}")))?;

        let mut messages = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_inbound(&row) {
                Ok(m) => messages.push(m),
                Err(e) => debug!("Skipping unparseable inbound row: {e}"),
            }
        }
        Ok(messages)
    }

    async fn update_inbound_status(
        &self,
        id: &str,
        status: InboundStatus,
    ) -> Result<(), DatabaseError> {
        let status_str = match status {
            InboundStatus::Pending => "pending",
            InboundStatus::Processed => "processed",
        };
        self.conn()
            .execute(
                "UPDATE inbound_messages SET status = ?1 WHERE id = ?2",
                params![status_str, id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_inbound_status: {e}")))?;
        Ok(())
    }
}
