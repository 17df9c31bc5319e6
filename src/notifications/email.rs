use anyhow::Result;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::EmailConfig;
use crate::db::BookingStatus;

/// Service for sending system emails
#[derive(Clone)]
pub struct EmailService {
    config: EmailConfig,
}

impl EmailService {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Check if email sending is configured and enabled
    pub fn is_enabled(&self) -> bool {
        self.config.is_configured()
    }

    /// Send a password reset email with a time-limited link
    pub async fn send_password_reset_email(
        &self,
        to_email: &str,
        name: &str,
        reset_url: &str,
        expires_in_minutes: i64,
    ) -> Result<()> {
        if !self.is_enabled() {
            tracing::warn!(
                "Email not configured, skipping password reset email to {}",
                to_email
            );
            return Ok(());
        }

        let subject = "Reset your password".to_string();
        let html_body = render_reset_html(name, reset_url, expires_in_minutes);
        let text_body = render_reset_text(name, reset_url, expires_in_minutes);

        self.send_email(to_email, &subject, &html_body, &text_body)
            .await
    }

    /// Notify a guest that an admin approved or rejected their booking
    pub async fn send_booking_status_email(
        &self,
        to_email: &str,
        name: &str,
        room_type: &str,
        check_in: &str,
        check_out: &str,
        status: BookingStatus,
    ) -> Result<()> {
        if !self.is_enabled() {
            tracing::warn!(
                "Email not configured, skipping booking status email to {}",
                to_email
            );
            return Ok(());
        }

        let subject = format!("Your booking has been {}", status);
        let html_body = render_status_html(name, room_type, check_in, check_out, status);
        let text_body = render_status_text(name, room_type, check_in, check_out, status);

        self.send_email(to_email, &subject, &html_body, &text_body)
            .await
    }

    /// Send an email with HTML and plain text versions
    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        html_body: &str,
        text_body: &str,
    ) -> Result<()> {
        let smtp_host = self
            .config
            .smtp_host
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("SMTP host not configured"))?;
        let from_address = self
            .config
            .from_address
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("From address not configured"))?;

        let from_mailbox = format!("{} <{}>", self.config.from_name, from_address);
        let from: Mailbox = from_mailbox.parse()?;
        let to: Mailbox = to_email.parse()?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        let mailer = if self.config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer
        };

        mailer.build().send(email).await?;

        tracing::info!(
            to = %to_email,
            subject = %subject,
            "Email sent successfully"
        );

        Ok(())
    }
}

fn render_reset_html(name: &str, reset_url: &str, expires_in_minutes: i64) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Password Reset</title></head>
<body style="font-family: -apple-system, 'Segoe UI', Roboto, Arial, sans-serif; background-color: #f5f5f5; margin: 0; padding: 24px;">
    <div style="max-width: 560px; margin: 0 auto; background: #ffffff; border-radius: 8px; padding: 32px;">
        <h1 style="font-size: 20px; margin-top: 0;">Password Reset</h1>
        <p>Hi {name},</p>
        <p>We received a request to reset the password for your account. Click the button below to choose a new one.</p>
        <p style="text-align: center; margin: 32px 0;">
            <a href="{reset_url}" style="background: #2563eb; color: #ffffff; text-decoration: none; padding: 12px 28px; border-radius: 6px;">Reset Password</a>
        </p>
        <p style="color: #6b7280; font-size: 13px;">This link expires in {expires_in_minutes} minutes. If you didn't request a reset, you can safely ignore this email.</p>
    </div>
</body>
</html>"#,
        name = html_escape(name),
        reset_url = reset_url,
        expires_in_minutes = expires_in_minutes,
    )
}

fn render_reset_text(name: &str, reset_url: &str, expires_in_minutes: i64) -> String {
    format!(
        r#"Password Reset

Hi {name},

We received a request to reset the password for your account.

To choose a new password, visit:
{reset_url}

This link expires in {expires_in_minutes} minutes. If you didn't request a
reset, you can safely ignore this email."#,
        name = name,
        reset_url = reset_url,
        expires_in_minutes = expires_in_minutes,
    )
}

fn render_status_html(
    name: &str,
    room_type: &str,
    check_in: &str,
    check_out: &str,
    status: BookingStatus,
) -> String {
    let color = match status {
        BookingStatus::Approved => "#16a34a",
        _ => "#dc2626",
    };
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Booking Update</title></head>
<body style="font-family: -apple-system, 'Segoe UI', Roboto, Arial, sans-serif; background-color: #f5f5f5; margin: 0; padding: 24px;">
    <div style="max-width: 560px; margin: 0 auto; background: #ffffff; border-radius: 8px; padding: 32px;">
        <h1 style="font-size: 20px; margin-top: 0;">Booking <span style="color: {color};">{status}</span></h1>
        <p>Hi {name},</p>
        <p>Your booking has been <strong>{status}</strong>.</p>
        <table style="width: 100%; border-collapse: collapse; margin: 20px 0;">
            <tr><td style="padding: 6px 0; color: #6b7280;">Room</td><td style="padding: 6px 0;">{room_type}</td></tr>
            <tr><td style="padding: 6px 0; color: #6b7280;">Check-in</td><td style="padding: 6px 0;">{check_in}</td></tr>
            <tr><td style="padding: 6px 0; color: #6b7280;">Check-out</td><td style="padding: 6px 0;">{check_out}</td></tr>
        </table>
    </div>
</body>
</html>"#,
        color = color,
        status = status,
        name = html_escape(name),
        room_type = html_escape(room_type),
        check_in = check_in,
        check_out = check_out,
    )
}

fn render_status_text(
    name: &str,
    room_type: &str,
    check_in: &str,
    check_out: &str,
    status: BookingStatus,
) -> String {
    format!(
        r#"Booking {status}

Hi {name},

Your booking has been {status}.

Room: {room_type}
Check-in: {check_in}
Check-out: {check_out}"#,
        status = status,
        name = name,
        room_type = room_type,
        check_in = check_in,
        check_out = check_out,
    )
}

/// Escape HTML special characters
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("<script>"), "&lt;script&gt;");
        assert_eq!(html_escape("Bed & Breakfast"), "Bed &amp; Breakfast");
    }

    #[test]
    fn test_render_reset_text() {
        let text = render_reset_text("Ada", "https://example.com/reset/u1/t1", 60);
        assert!(text.contains("Ada"));
        assert!(text.contains("https://example.com/reset/u1/t1"));
        assert!(text.contains("60 minutes"));
    }

    #[test]
    fn test_render_status_html() {
        let html = render_status_html(
            "Ada",
            "double deluxe",
            "2024-06-01",
            "2024-06-05",
            BookingStatus::Approved,
        );
        assert!(html.contains("Ada"));
        assert!(html.contains("double deluxe"));
        assert!(html.contains("approved"));
        assert!(html.contains("<!DOCTYPE html>"));
    }

    #[test]
    fn test_render_status_text_rejected() {
        let text = render_status_text(
            "Ada",
            "single",
            "2024-06-01",
            "2024-06-05",
            BookingStatus::Rejected,
        );
        assert!(text.contains("rejected"));
        assert!(text.contains("2024-06-05"));
    }
}
