//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: r#"
        CREATE TABLE IF NOT EXISTS teachers (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'ACTIVE'
        );
        CREATE INDEX IF NOT EXISTS idx_teachers_email ON teachers(email);

        CREATE TABLE IF NOT EXISTS students (
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL UNIQUE,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            email TEXT,
            status TEXT NOT NULL DEFAULT 'ACTIVE'
        );
        CREATE INDEX IF NOT EXISTS idx_students_student_id ON students(student_id);

        CREATE TABLE IF NOT EXISTS classes (
            id TEXT PRIMARY KEY,
            term_id TEXT,
            name TEXT NOT NULL,
            subject TEXT,
            teacher_id TEXT NOT NULL REFERENCES teachers(id),
            status TEXT NOT NULL DEFAULT 'ACTIVE'
        );
        CREATE INDEX IF NOT EXISTS idx_classes_name ON classes(name);

        CREATE TABLE IF NOT EXISTS enrollments (
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL REFERENCES classes(id),
            student_id TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            joined_at TEXT NOT NULL,
            left_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_enrollments_lookup
            ON enrollments(student_id, class_id, active);

        CREATE TABLE IF NOT EXISTS assignments (
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            class_id TEXT NOT NULL REFERENCES classes(id),
            title TEXT NOT NULL,
            instructions TEXT NOT NULL DEFAULT '',
            rubric TEXT NOT NULL DEFAULT '',
            deadline_at TEXT NOT NULL,
            deadline_tz TEXT NOT NULL DEFAULT 'CT',
            created_by_teacher_id TEXT NOT NULL REFERENCES teachers(id),
            status TEXT NOT NULL DEFAULT 'SCHEDULED',
            grace_days INTEGER NOT NULL DEFAULT 7,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_assignments_code ON assignments(code);

        CREATE TABLE IF NOT EXISTS submissions (
            id TEXT PRIMARY KEY,
            assignment_id TEXT NOT NULL REFERENCES assignments(id),
            student_id TEXT NOT NULL,
            received_at TEXT NOT NULL,
            on_time INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'RECEIVED',
            UNIQUE (assignment_id, student_id)
        );
        CREATE INDEX IF NOT EXISTS idx_submissions_assignment
            ON submissions(assignment_id);

        CREATE TABLE IF NOT EXISTS grades (
            id TEXT PRIMARY KEY,
            assignment_id TEXT NOT NULL REFERENCES assignments(id),
            student_id TEXT NOT NULL,
            grade_value TEXT NOT NULL,
            feedback_text TEXT NOT NULL DEFAULT '',
            graded_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_grades_assignment ON grades(assignment_id);

        CREATE TABLE IF NOT EXISTS email_messages (
            id TEXT PRIMARY KEY,
            direction TEXT NOT NULL,
            from_email TEXT NOT NULL,
            to_emails TEXT NOT NULL DEFAULT '[]',
            subject TEXT NOT NULL,
            message_id TEXT NOT NULL UNIQUE,
            processed_at TEXT NOT NULL,
            parse_result TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_email_messages_message_id
            ON email_messages(message_id);

        CREATE TABLE IF NOT EXISTS inbound_messages (
            id TEXT PRIMARY KEY,
            message_id TEXT NOT NULL UNIQUE,
            sender TEXT NOT NULL,
            recipients TEXT NOT NULL DEFAULT '[]',
            subject TEXT NOT NULL,
            body TEXT NOT NULL,
            received_at TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_inbound_messages_status
            ON inbound_messages(status);
    "#,
}];

/// Run all pending migrations against the given connection.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            record_version(conn, migration.version, migration.name).await?;
        }
    }

    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => row.get(0).map_err(|e| {
            DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
        }),
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn record_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
