//! Outbound email for password resets and booking status changes.
//!
//! All sends are best-effort: callers commit their primary state first and
//! only log a failed delivery.

mod email;

pub use email::EmailService;
