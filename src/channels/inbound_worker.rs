//! Background worker — drains the inbound queue through the pipeline.
//!
//! Timer-based loop:
//! 1. `pending_inbound()` from the store
//! 2. `EmailProcessor::process()` → reply text + outcome
//! 3. SMTP reply to the sender ("Re: original subject")
//! 4. `update_inbound_status(Processed)`
//!
//! A failed process leaves the row pending for the next tick. A failed
//! reply does not: the audit record exists and the work is done, so the
//! row is marked processed and the send failure is logged.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::channels::email::{self, EmailConfig};
use crate::pipeline::{EmailProcessor, InboundEmail};
use crate::store::{Database, InboundStatus, StoredInbound};

/// Default drain interval between queue scans.
const DEFAULT_DRAIN_INTERVAL_SECS: u64 = 30;

/// Spawn a background task that processes queued inbound emails.
///
/// Returns a `JoinHandle` and shutdown flag.
pub fn spawn_inbound_worker(
    config: EmailConfig,
    db: Arc<dyn Database>,
    processor: Arc<EmailProcessor>,
    interval_secs: Option<u64>,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let interval = interval_secs.unwrap_or_else(|| {
        std::env::var("EMAIL_DRAIN_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_DRAIN_INTERVAL_SECS)
    });

    let handle = tokio::spawn(async move {
        info!("Inbound worker started — draining every {interval}s");

        let mut tick = tokio::time::interval(Duration::from_secs(interval));

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Inbound worker shutting down");
                return;
            }

            drain_pending(&config, &db, &processor).await;
        }
    });

    (handle, shutdown_flag)
}

/// Process all pending inbound emails through the pipeline.
async fn drain_pending(
    config: &EmailConfig,
    db: &Arc<dyn Database>,
    processor: &Arc<EmailProcessor>,
) {
    let pending = match db.pending_inbound().await {
        Ok(rows) => rows,
        Err(e) => {
            error!("Failed to fetch pending inbound emails: {e}");
            return;
        }
    };

    if pending.is_empty() {
        return;
    }

    info!("Processing {} pending email(s)", pending.len());

    for stored in &pending {
        let inbound = stored_to_inbound(stored);

        let reply = match processor.process(&inbound).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(id = %stored.id, error = %e, "Failed to process email");
                // Leave pending for the next tick
                continue;
            }
        };

        debug!(
            id = %stored.id,
            outcome = reply.outcome.label(),
            "Email processed"
        );

        let subject = reply_subject(&stored.subject);
        let cfg = config.clone();
        let to = stored.sender.clone();
        let body = reply.response.clone();
        let send_result =
            tokio::task::spawn_blocking(move || email::send_reply(&cfg, &to, &subject, &body))
                .await;

        match send_result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(id = %stored.id, error = %e, "Failed to send reply"),
            Err(e) => warn!(id = %stored.id, error = %e, "Reply task panicked"),
        }

        if let Err(e) = db
            .update_inbound_status(&stored.id, InboundStatus::Processed)
            .await
        {
            warn!(id = %stored.id, error = %e, "Failed to update inbound status");
        }
    }
}

/// Convert a queued row into the pipeline's input type.
fn stored_to_inbound(stored: &StoredInbound) -> InboundEmail {
    InboundEmail {
        subject: stored.subject.clone(),
        body: stored.body.clone(),
        from_email: stored.sender.clone(),
        to_emails: stored.recipients.clone(),
        message_id: stored.message_id.clone(),
    }
}

/// Reply subject: "Re: " prefixed unless already present.
fn reply_subject(original: &str) -> String {
    if original.to_lowercase().starts_with("re:") {
        original.to_string()
    } else {
        format!("Re: {original}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_stored(subject: &str) -> StoredInbound {
        StoredInbound {
            id: "row-1".to_string(),
            message_id: "<abc@mail.test>".to_string(),
            sender: "jane@school.test".to_string(),
            recipients: vec!["assignments@school.test".to_string()],
            subject: subject.to_string(),
            body: "Title: Essay\nClass: English 7\nDeadline: 2025-01-15".to_string(),
            received_at: Utc::now(),
            status: InboundStatus::Pending,
        }
    }

    #[test]
    fn stored_to_inbound_maps_fields() {
        let stored = make_stored("ASSIGN");
        let inbound = stored_to_inbound(&stored);

        assert_eq!(inbound.subject, "ASSIGN");
        assert_eq!(inbound.from_email, "jane@school.test");
        assert_eq!(inbound.to_emails, vec!["assignments@school.test"]);
        assert_eq!(inbound.message_id, "<abc@mail.test>");
        assert!(inbound.body.contains("English 7"));
    }

    #[test]
    fn reply_subject_prefixes_re() {
        assert_eq!(reply_subject("ASSIGN"), "Re: ASSIGN");
    }

    #[test]
    fn reply_subject_keeps_existing_re() {
        assert_eq!(reply_subject("Re: ASSIGN"), "Re: ASSIGN");
        assert_eq!(reply_subject("RE: ASSIGN"), "RE: ASSIGN");
    }
}
