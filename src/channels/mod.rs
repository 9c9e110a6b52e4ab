//! Email transport: IMAP polling in, SMTP replies out.

pub mod email;
pub mod email_poller;
pub mod inbound_worker;

pub use email::EmailConfig;
pub use email_poller::spawn_email_poller;
pub use inbound_worker::spawn_inbound_worker;
