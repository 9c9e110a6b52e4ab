//! Development data seeding — sample teachers, students, classes, and
//! enrollments so a fresh database can accept commands.
//!
//! Idempotent: existing rows are looked up first and skipped, so the
//! seeder can run against a live database without duplicating the
//! directory.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::models::{ClassSection, Enrollment, Student, Teacher};
use crate::store::Database;

/// Rows created by one seeding run (already-present rows not counted).
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub teachers: usize,
    pub students: usize,
    pub classes: usize,
    pub enrollments: usize,
}

const TEACHERS: &[(&str, &str, &str)] = &[
    ("jane.smith@school.example", "Jane", "Smith"),
    ("john.doe@school.example", "John", "Doe"),
    ("mary.wilson@school.example", "Mary", "Wilson"),
];

const STUDENTS: &[(&str, &str, &str)] = &[
    ("STU001", "Emma", "Johnson"),
    ("STU002", "Liam", "Brown"),
    ("STU003", "Olivia", "Davis"),
    ("STU004", "Noah", "Miller"),
    ("STU005", "Ava", "Wilson"),
];

/// (class name, subject, teacher email)
const CLASSES: &[(&str, &str, &str)] = &[
    ("English 7", "English", "jane.smith@school.example"),
    ("Math 7", "Mathematics", "john.doe@school.example"),
    ("Science 7", "Science", "mary.wilson@school.example"),
];

/// Insert the sample directory, skipping rows that already exist.
/// Every student ends up enrolled in every class.
pub async fn seed_dev_data(db: &dyn Database) -> Result<SeedSummary, DatabaseError> {
    let mut summary = SeedSummary::default();

    for (email, first, last) in TEACHERS {
        if db.teacher_by_email(email).await?.is_some() {
            continue;
        }
        db.insert_teacher(&Teacher {
            id: Uuid::new_v4().to_string(),
            email: (*email).to_string(),
            first_name: (*first).to_string(),
            last_name: (*last).to_string(),
            status: "ACTIVE".to_string(),
        })
        .await?;
        summary.teachers += 1;
    }

    for (student_id, first, last) in STUDENTS {
        if db.student_by_id(student_id).await?.is_some() {
            continue;
        }
        db.insert_student(&Student {
            id: Uuid::new_v4().to_string(),
            student_id: (*student_id).to_string(),
            first_name: (*first).to_string(),
            last_name: (*last).to_string(),
            email: None,
            status: "ACTIVE".to_string(),
        })
        .await?;
        summary.students += 1;
    }

    for (name, subject, teacher_email) in CLASSES {
        if db.class_by_name(name).await?.is_some() {
            continue;
        }
        let teacher = db.teacher_by_email(teacher_email).await?.ok_or_else(|| {
            DatabaseError::Query(format!("seed_dev_data: teacher {teacher_email} missing"))
        })?;
        db.insert_class(&ClassSection {
            id: Uuid::new_v4().to_string(),
            term_id: None,
            name: (*name).to_string(),
            subject: Some((*subject).to_string()),
            teacher_id: teacher.id,
            status: "ACTIVE".to_string(),
        })
        .await?;
        summary.classes += 1;
    }

    for (name, _, _) in CLASSES {
        let class = db.class_by_name(name).await?.ok_or_else(|| {
            DatabaseError::Query(format!("seed_dev_data: class {name} missing"))
        })?;
        for (student_id, _, _) in STUDENTS {
            if db.is_enrolled(student_id, &class.id).await? {
                continue;
            }
            db.insert_enrollment(&Enrollment {
                id: Uuid::new_v4().to_string(),
                class_id: class.id.clone(),
                student_id: (*student_id).to_string(),
                active: true,
                joined_at: Utc::now(),
                left_at: None,
            })
            .await?;
            summary.enrollments += 1;
        }
    }

    info!(
        teachers = summary.teachers,
        students = summary.students,
        classes = summary.classes,
        enrollments = summary.enrollments,
        "Development data seeded"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;

    #[tokio::test]
    async fn seeds_full_directory() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let summary = seed_dev_data(&db).await.unwrap();

        assert_eq!(summary.teachers, 3);
        assert_eq!(summary.students, 5);
        assert_eq!(summary.classes, 3);
        assert_eq!(summary.enrollments, 15);

        // Seeded teacher is whitelisted, students are enrolled.
        assert!(
            db.teacher_by_email("jane.smith@school.example")
                .await
                .unwrap()
                .is_some()
        );
        let english = db.class_by_name("English 7").await.unwrap().unwrap();
        assert!(db.is_enrolled("STU001", &english.id).await.unwrap());
        assert!(db.is_enrolled("STU005", &english.id).await.unwrap());
    }

    #[tokio::test]
    async fn reseeding_creates_nothing() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        seed_dev_data(&db).await.unwrap();

        let second = seed_dev_data(&db).await.unwrap();
        assert_eq!(second, SeedSummary::default());
    }

    #[tokio::test]
    async fn seeded_teacher_can_create_assignments() {
        use crate::pipeline::{EmailProcessor, InboundEmail, Outcome};
        use std::sync::Arc;

        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        seed_dev_data(db.as_ref()).await.unwrap();

        let processor = EmailProcessor::new(Arc::clone(&db));
        let reply = processor
            .process(&InboundEmail {
                subject: "ASSIGN".into(),
                body: "Title: Fractions\nClass: Math 7\nDeadline: 2025-02-10".into(),
                from_email: "john.doe@school.example".into(),
                to_emails: vec!["assignments@school.example".into()],
                message_id: "seed-msg-1".into(),
            })
            .await
            .unwrap();

        assert_eq!(
            reply.outcome,
            Outcome::AssignmentCreated {
                code: "MATH7-0210".into()
            }
        );
    }
}
