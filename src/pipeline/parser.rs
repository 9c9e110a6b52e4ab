//! Subject-line command classification.
//!
//! Each command kind has an independent matcher that either extracts
//! typed fields or reports no match. [`classify`] chains them in fixed
//! priority order: ASSIGNMENT, SUBMISSION, GRADE, RETURN. Malformed
//! commands (bad date, missing required field) fall through to the next
//! matcher rather than raising — a broken command is indistinguishable
//! from an email that is not a command at all.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use regex::Regex;

use crate::pipeline::types::{AssignmentDraft, Command, GradeSlip};

static SUBMIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^SUBMIT\s+(\S+)").unwrap());
static GRADE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^GRADE\s+(\S+)\s+(\S+)").unwrap());
static RETURN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^RETURN\s+(\S+)\s+(\S+)").unwrap());

/// Classify an email into a command, trying each matcher in priority
/// order. Returns `None` when no grammar matches (UNKNOWN_COMMAND).
pub fn classify(subject: &str, body: &str) -> Option<Command> {
    if let Some(draft) = parse_assignment(subject, body) {
        return Some(Command::Assignment(draft));
    }
    if let Some((assignment_code, student_id)) = parse_submission(subject, body) {
        return Some(Command::Submission {
            assignment_code,
            student_id,
        });
    }
    if let Some(slip) = parse_grade(subject, body) {
        return Some(Command::Grade(slip));
    }
    if let Some(slip) = parse_return(subject, body) {
        return Some(Command::Return(slip));
    }
    None
}

/// Parse an ASSIGN email. Subject must start with "ASSIGN" (trimmed,
/// case-insensitive); body must carry `title`, `class`, and a parseable
/// `deadline`. Returns `None` on any missing/malformed field.
pub fn parse_assignment(subject: &str, body: &str) -> Option<AssignmentDraft> {
    if !subject.trim().to_uppercase().starts_with("ASSIGN") {
        return None;
    }

    let fields = body_fields(body);

    let title = fields.get("title")?.clone();
    let class_name = fields.get("class")?.clone();
    let deadline_at = parse_deadline(fields.get("deadline")?)?;

    let code = derive_code(&class_name, &deadline_at);

    Some(AssignmentDraft {
        code,
        title,
        class_name,
        deadline_at,
        instructions: fields.get("instructions").cloned().unwrap_or_default(),
        rubric: fields.get("rubric").cloned().unwrap_or_default(),
    })
}

/// Parse a SUBMIT email. Subject: `SUBMIT <code>` (matched against the
/// upper-cased subject, so the code comes out upper-cased). Body must
/// carry a non-empty `StudentID:` line.
pub fn parse_submission(subject: &str, body: &str) -> Option<(String, String)> {
    let upper = subject.to_uppercase();
    let caps = SUBMIT_RE.captures(&upper)?;
    let assignment_code = caps[1].to_string();

    let student_id = student_id_line(body)?;
    Some((assignment_code, student_id))
}

/// Parse a GRADE email. Subject: `GRADE <code> <student>`. The `grade`
/// body key is required; `feedback` is optional.
pub fn parse_grade(subject: &str, body: &str) -> Option<GradeSlip> {
    let upper = subject.to_uppercase();
    let caps = GRADE_RE.captures(&upper)?;

    let fields = body_fields(body);
    let grade_value = fields.get("grade")?.clone();

    Some(GradeSlip {
        assignment_code: caps[1].to_string(),
        student_id: caps[2].to_string(),
        grade_value,
        feedback_text: fields.get("feedback").cloned().unwrap_or_default(),
    })
}

/// Parse a RETURN email — the legacy grading verb. Identical to GRADE
/// except a missing `grade` key yields an empty value, not a non-match.
pub fn parse_return(subject: &str, body: &str) -> Option<GradeSlip> {
    let upper = subject.to_uppercase();
    let caps = RETURN_RE.captures(&upper)?;

    let fields = body_fields(body);

    Some(GradeSlip {
        assignment_code: caps[1].to_string(),
        student_id: caps[2].to_string(),
        grade_value: fields.get("grade").cloned().unwrap_or_default(),
        feedback_text: fields.get("feedback").cloned().unwrap_or_default(),
    })
}

/// Derive the assignment code: class name with spaces removed,
/// upper-cased, truncated to 8 chars, then `-MMDD` of the deadline.
/// Example: "Math 7" + 2025-01-20 → "MATH7-0120".
pub fn derive_code(class_name: &str, deadline: &NaiveDateTime) -> String {
    let token: String = class_name
        .replace(' ', "")
        .to_uppercase()
        .chars()
        .take(8)
        .collect();
    format!("{token}-{:02}{:02}", deadline.month(), deadline.day())
}

/// Split a body into `key: value` pairs. First colon separates key from
/// value; keys are lower-cased and trimmed; lines without a colon are
/// ignored.
fn body_fields(body: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for line in body.lines() {
        let line = line.trim();
        if let Some((key, value)) = line.split_once(':') {
            fields.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }
    fields
}

/// Parse a deadline field: strip a trailing "CT" label, then accept
/// `YYYY-MM-DD HH:MM` or bare `YYYY-MM-DD` (defaulting to 23:59).
fn parse_deadline(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    let s = s.strip_suffix("CT").unwrap_or(s).trim();

    if s.contains(' ') {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").ok()
    } else {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()?
            .and_hms_opt(23, 59, 0)
    }
}

/// Find the first non-empty `StudentID:` line (case-insensitive prefix).
fn student_id_line(body: &str) -> Option<String> {
    for line in body.lines() {
        let line = line.trim();
        if line.to_uppercase().starts_with("STUDENTID:") {
            let value = line.split_once(':')?.1.trim();
            if value.is_empty() {
                return None;
            }
            return Some(value.to_string());
        }
    }
    None
}
