//! Background IMAP poller — fetches unseen emails and queues them.
//!
//! The poller only moves mail: fetch unseen, filter (self-loop,
//! allowlist, dedup), insert into the inbound queue as "pending", then
//! mark `\Seen`. The inbound worker drains the queue through the
//! command pipeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::channels::email::{self, EmailConfig, is_sender_allowed};
use crate::store::Database;

/// Spawn a background task that polls IMAP and queues new emails.
///
/// Returns a `JoinHandle` and a shutdown flag. Set the flag to stop polling.
pub fn spawn_email_poller(
    config: EmailConfig,
    db: Arc<dyn Database>,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(
            "Email poller started — polling every {}s on {}",
            config.poll_interval_secs, config.imap_host
        );

        let mut tick = tokio::time::interval(Duration::from_secs(config.poll_interval_secs));

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Email poller shutting down");
                return;
            }

            poll_once(&config, &db).await;
        }
    });

    (handle, shutdown_flag)
}

/// Run a single poll cycle: fetch unseen → queue → mark `\Seen`.
async fn poll_once(config: &EmailConfig, db: &Arc<dyn Database>) {
    let cfg = config.clone();
    let fetch_result = tokio::task::spawn_blocking(move || email::fetch_unseen_imap(&cfg)).await;

    let messages = match fetch_result {
        Ok(Ok(msgs)) => msgs,
        Ok(Err(e)) => {
            error!("Email poll failed: {e}");
            return;
        }
        Err(e) => {
            error!("Email poll task panicked: {e}");
            return;
        }
    };

    if messages.is_empty() {
        return;
    }

    debug!("Fetched {} unseen emails", messages.len());

    let mut uids_to_mark: Vec<String> = Vec::new();
    let from_addr = &config.from_address;

    for fetched in &messages {
        // Self-loop prevention
        if fetched.sender.eq_ignore_ascii_case(from_addr) {
            debug!(sender = %fetched.sender, "Skipping self-sent email");
            uids_to_mark.push(fetched.uid.clone());
            continue;
        }

        // Allowlist check
        if !is_sender_allowed(&config.allowed_senders, &fetched.sender) {
            warn!("Blocked email from {}", fetched.sender);
            uids_to_mark.push(fetched.uid.clone());
            continue;
        }

        // Dedup: skip if already queued
        if db
            .inbound_by_message_id(&fetched.message_id)
            .await
            .ok()
            .flatten()
            .is_some()
        {
            uids_to_mark.push(fetched.uid.clone());
            continue;
        }

        #[allow(clippy::cast_possible_wrap)]
        let received_at = chrono::DateTime::from_timestamp(fetched.timestamp as i64, 0)
            .unwrap_or_else(chrono::Utc::now);

        match db
            .insert_inbound(
                &fetched.message_id,
                &fetched.sender,
                &fetched.recipients,
                &fetched.subject,
                &fetched.body,
                received_at,
            )
            .await
        {
            Ok(id) => {
                debug!(id = %id, message_id = %fetched.message_id, "Queued inbound email");
            }
            Err(e) => {
                error!("Failed to queue inbound email: {e}");
            }
        }

        uids_to_mark.push(fetched.uid.clone());
    }

    // Mark all handled emails as \Seen
    if !uids_to_mark.is_empty() {
        let cfg = config.clone();
        let uids = uids_to_mark;
        if let Err(e) = tokio::task::spawn_blocking(move || email::mark_seen_imap(&cfg, &uids))
            .await
            .unwrap_or_else(|e| Err(e.to_string().into()))
        {
            warn!("Failed to mark emails as seen: {e}");
        }
    }
}
