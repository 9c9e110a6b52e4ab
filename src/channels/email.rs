//! Email transport — IMAP fetch for inbound, SMTP via lettre for replies.
//!
//! Fetching is blocking raw IMAP over rustls and must run inside
//! `spawn_blocking`. Fetched messages are NOT marked `\Seen` here; the
//! poller marks them only after they are safely queued in the store.

use std::io::Write as IoWrite;
use std::net::TcpStream;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use mail_parser::MessageParser;
use uuid::Uuid;

use crate::error::ChannelError;

// ── Configuration ───────────────────────────────────────────────────

/// Email transport configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
    pub poll_interval_secs: u64,
    pub allowed_senders: Vec<String>,
}

impl EmailConfig {
    /// Build config from environment variables.
    /// Returns `None` if `EMAIL_IMAP_HOST` is not set (email disabled).
    pub fn from_env() -> Option<Self> {
        let imap_host = std::env::var("EMAIL_IMAP_HOST").ok()?;

        let imap_port: u16 = std::env::var("EMAIL_IMAP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(993);

        let smtp_host =
            std::env::var("EMAIL_SMTP_HOST").unwrap_or_else(|_| imap_host.replace("imap", "smtp"));

        let smtp_port: u16 = std::env::var("EMAIL_SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("EMAIL_USERNAME").unwrap_or_default();
        let password = std::env::var("EMAIL_PASSWORD").unwrap_or_default();
        let from_address = std::env::var("EMAIL_FROM_ADDRESS").unwrap_or_else(|_| username.clone());

        let poll_interval_secs: u64 = std::env::var("EMAIL_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);

        let allowed_senders: Vec<String> = std::env::var("EMAIL_ALLOWED_SENDERS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Some(Self {
            imap_host,
            imap_port,
            smtp_host,
            smtp_port,
            username,
            password,
            from_address,
            poll_interval_secs,
            allowed_senders,
        })
    }
}

// ── Outbound (SMTP) ─────────────────────────────────────────────────

/// Send a reply email via SMTP.
pub fn send_reply(
    config: &EmailConfig,
    to: &str,
    subject: &str,
    body: &str,
) -> Result<(), ChannelError> {
    let creds = Credentials::new(config.username.clone(), config.password.clone());

    let transport = SmtpTransport::relay(&config.smtp_host)
        .map_err(|e| ChannelError::SendFailed {
            to: to.into(),
            reason: format!("SMTP relay error: {e}"),
        })?
        .port(config.smtp_port)
        .credentials(creds)
        .build();

    let email = Message::builder()
        .from(
            config
                .from_address
                .parse()
                .map_err(|e| ChannelError::SendFailed {
                    to: to.into(),
                    reason: format!("Invalid from address: {e}"),
                })?,
        )
        .to(to.parse().map_err(|e| ChannelError::SendFailed {
            to: to.into(),
            reason: format!("Invalid to address: {e}"),
        })?)
        .subject(subject)
        .body(body.to_string())
        .map_err(|e| ChannelError::SendFailed {
            to: to.into(),
            reason: format!("Failed to build email: {e}"),
        })?;

    transport.send(&email).map_err(|e| ChannelError::SendFailed {
        to: to.into(),
        reason: format!("SMTP send failed: {e}"),
    })?;

    tracing::info!("Reply sent to {to}");
    Ok(())
}

// ── Helpers (public for testing) ────────────────────────────────────

/// Check if a sender email is in the allowlist.
///
/// - Empty list → deny all
/// - `*` in list → allow all
/// - `@domain.com` or `domain.com` → domain match
/// - `user@domain.com` → exact email match
pub fn is_sender_allowed(allowed: &[String], email: &str) -> bool {
    if allowed.is_empty() {
        return false;
    }
    if allowed.iter().any(|a| a == "*") {
        return true;
    }
    let email_lower = email.to_lowercase();
    allowed.iter().any(|a| {
        if a.starts_with('@') {
            // "@example.com" → domain match
            email_lower.ends_with(&a.to_lowercase())
        } else if a.contains('@') {
            // "user@example.com" → exact email match
            a.eq_ignore_ascii_case(email)
        } else {
            // "example.com" → domain match
            email_lower.ends_with(&format!("@{}", a.to_lowercase()))
        }
    })
}

/// Strip HTML tags from content (basic).
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    // Normalize whitespace
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract the sender address from a parsed email.
fn extract_sender(parsed: &mail_parser::Message) -> String {
    parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".into())
}

/// Extract all To addresses from a parsed email.
fn extract_recipients(parsed: &mail_parser::Message) -> Vec<String> {
    parsed
        .to()
        .map(|addr| {
            addr.iter()
                .filter_map(|a| a.address())
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Extract readable text from a parsed email.
fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    "(no readable content)".to_string()
}

/// One email pulled from the inbox, not yet marked `\Seen`.
#[derive(Debug, Clone)]
pub struct FetchedEmail {
    pub uid: String,
    pub message_id: String,
    pub sender: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub timestamp: u64,
}

/// Error type for IMAP operations.
pub type ImapError = Box<dyn std::error::Error + Send + Sync>;

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// Open a TLS connection to the IMAP server and log in.
fn imap_connect(config: &EmailConfig) -> Result<TlsStream, ImapError> {
    use std::sync::Arc as StdArc;

    let tcp = TcpStream::connect((&*config.imap_host, config.imap_port))?;
    tcp.set_read_timeout(Some(Duration::from_secs(30)))?;

    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = StdArc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    );
    let server_name: rustls::pki_types::ServerName<'_> =
        rustls::pki_types::ServerName::try_from(config.imap_host.clone())?;
    let conn = rustls::ClientConnection::new(tls_config, server_name)?;
    let mut tls = rustls::StreamOwned::new(conn, tcp);

    // Greeting, then login
    let _greeting = read_line(&mut tls)?;
    let login_resp = send_cmd(
        &mut tls,
        "A1",
        &format!("LOGIN \"{}\" \"{}\"", config.username, config.password),
    )?;
    if !login_resp.last().is_some_and(|l| l.contains("OK")) {
        return Err("IMAP login failed".into());
    }

    Ok(tls)
}

fn read_line(tls: &mut TlsStream) -> Result<String, ImapError> {
    let mut buf = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        match std::io::Read::read(tls, &mut byte) {
            Ok(0) => return Err("IMAP connection closed".into()),
            Ok(_) => {
                buf.push(byte[0]);
                if buf.ends_with(b"\r\n") {
                    return Ok(String::from_utf8_lossy(&buf).to_string());
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn send_cmd(tls: &mut TlsStream, tag: &str, cmd: &str) -> Result<Vec<String>, ImapError> {
    let full = format!("{tag} {cmd}\r\n");
    IoWrite::write_all(tls, full.as_bytes())?;
    IoWrite::flush(tls)?;
    let mut lines = Vec::new();
    loop {
        let line = read_line(tls)?;
        let done = line.starts_with(tag);
        lines.push(line);
        if done {
            break;
        }
    }
    Ok(lines)
}

/// Fetch unseen emails via raw IMAP over TLS (blocking — run in
/// `spawn_blocking`). Does not alter message flags.
pub fn fetch_unseen_imap(config: &EmailConfig) -> Result<Vec<FetchedEmail>, ImapError> {
    let mut tls = imap_connect(config)?;

    let _select = send_cmd(&mut tls, "A2", "SELECT \"INBOX\"")?;

    let search_resp = send_cmd(&mut tls, "A3", "SEARCH UNSEEN")?;
    let mut uids: Vec<String> = Vec::new();
    for line in &search_resp {
        if line.starts_with("* SEARCH") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() > 2 {
                uids.extend(parts[2..].iter().map(|s| s.to_string()));
            }
        }
    }

    let mut results = Vec::new();
    let mut tag_counter = 4_u32;

    for uid in &uids {
        let fetch_tag = format!("A{tag_counter}");
        tag_counter += 1;
        let fetch_resp = send_cmd(&mut tls, &fetch_tag, &format!("FETCH {uid} RFC822"))?;

        let raw: String = fetch_resp
            .iter()
            .skip(1)
            .take(fetch_resp.len().saturating_sub(2))
            .cloned()
            .collect();

        if let Some(parsed) = MessageParser::default().parse(raw.as_bytes()) {
            let sender = extract_sender(&parsed);
            let recipients = extract_recipients(&parsed);
            let subject = parsed.subject().unwrap_or("(no subject)").to_string();
            let body = extract_text(&parsed);
            let message_id = parsed
                .message_id()
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("gen-{}", Uuid::new_v4()));

            #[allow(clippy::cast_sign_loss)]
            let timestamp = parsed
                .date()
                .map(|d| {
                    let naive = chrono::NaiveDate::from_ymd_opt(
                        d.year as i32,
                        u32::from(d.month),
                        u32::from(d.day),
                    )
                    .and_then(|date| {
                        date.and_hms_opt(
                            u32::from(d.hour),
                            u32::from(d.minute),
                            u32::from(d.second),
                        )
                    });
                    naive.map_or(0, |n| n.and_utc().timestamp() as u64)
                })
                .unwrap_or_else(|| {
                    SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_secs())
                        .unwrap_or(0)
                });

            results.push(FetchedEmail {
                uid: uid.clone(),
                message_id,
                sender,
                recipients,
                subject,
                body,
                timestamp,
            });
        }
    }

    let logout_tag = format!("A{tag_counter}");
    let _ = send_cmd(&mut tls, &logout_tag, "LOGOUT");

    Ok(results)
}

/// Mark the given UIDs `\Seen` (blocking — run in `spawn_blocking`).
pub fn mark_seen_imap(config: &EmailConfig, uids: &[String]) -> Result<(), ImapError> {
    if uids.is_empty() {
        return Ok(());
    }

    let mut tls = imap_connect(config)?;
    let _select = send_cmd(&mut tls, "A2", "SELECT \"INBOX\"")?;

    let mut tag_counter = 3_u32;
    for uid in uids {
        let tag = format!("A{tag_counter}");
        tag_counter += 1;
        let _ = send_cmd(&mut tls, &tag, &format!("STORE {uid} +FLAGS (\\Seen)"));
    }

    let logout_tag = format!("A{tag_counter}");
    let _ = send_cmd(&mut tls, &logout_tag, "LOGOUT");

    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Sender allowlist tests ──────────────────────────────────────

    #[test]
    fn allowlist_empty_denies_all() {
        assert!(!is_sender_allowed(&[], "anyone@example.com"));
    }

    #[test]
    fn allowlist_wildcard_allows_all() {
        let allowed = vec!["*".to_string()];
        assert!(is_sender_allowed(&allowed, "anyone@example.com"));
        assert!(is_sender_allowed(&allowed, "test@other.org"));
    }

    #[test]
    fn allowlist_exact_email_match() {
        let allowed = vec!["jane@school.test".to_string()];
        assert!(is_sender_allowed(&allowed, "jane@school.test"));
        assert!(is_sender_allowed(&allowed, "Jane@School.Test"));
        assert!(!is_sender_allowed(&allowed, "bob@school.test"));
    }

    #[test]
    fn allowlist_domain_with_at_prefix() {
        let allowed = vec!["@school.test".to_string()];
        assert!(is_sender_allowed(&allowed, "jane@school.test"));
        assert!(is_sender_allowed(&allowed, "bob@school.test"));
        assert!(!is_sender_allowed(&allowed, "jane@other.test"));
    }

    #[test]
    fn allowlist_domain_without_at_prefix() {
        let allowed = vec!["school.test".to_string()];
        assert!(is_sender_allowed(&allowed, "jane@school.test"));
        assert!(!is_sender_allowed(&allowed, "jane@other.test"));
    }

    #[test]
    fn allowlist_mixed_entries() {
        let allowed = vec![
            "admin@district.test".to_string(),
            "@school.test".to_string(),
            "partner.io".to_string(),
        ];
        assert!(is_sender_allowed(&allowed, "admin@district.test"));
        assert!(is_sender_allowed(&allowed, "anyone@school.test"));
        assert!(is_sender_allowed(&allowed, "ceo@partner.io"));
        assert!(!is_sender_allowed(&allowed, "random@evil.com"));
    }

    #[test]
    fn allowlist_case_insensitive_domain() {
        let allowed = vec!["@School.TEST".to_string()];
        assert!(is_sender_allowed(&allowed, "user@school.test"));
        assert!(is_sender_allowed(&allowed, "user@SCHOOL.TEST"));
    }

    // ── HTML stripping tests ────────────────────────────────────────

    #[test]
    fn strip_html_basic() {
        assert_eq!(strip_html("<p>Hello</p>"), "Hello");
    }

    #[test]
    fn strip_html_nested_tags() {
        assert_eq!(
            strip_html("<div><b>Bold</b> and <i>italic</i></div>"),
            "Bold and italic"
        );
    }

    #[test]
    fn strip_html_with_attributes() {
        assert_eq!(
            strip_html(r#"<a href="https://example.com">Link</a>"#),
            "Link"
        );
    }

    #[test]
    fn strip_html_whitespace_normalized() {
        assert_eq!(strip_html("<p>  Hello   World  </p>"), "Hello World");
    }

    #[test]
    fn strip_html_plain_text_passthrough() {
        assert_eq!(strip_html("No HTML here"), "No HTML here");
    }

    // ── Config tests ────────────────────────────────────────────────

    #[test]
    fn config_from_env_returns_none_when_no_host() {
        // SAFETY: no other thread reads EMAIL_IMAP_HOST concurrently.
        unsafe { std::env::remove_var("EMAIL_IMAP_HOST") };
        assert!(EmailConfig::from_env().is_none());
    }
}
