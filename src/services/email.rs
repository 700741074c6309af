// src/services/email.rs
//! Outbound mail: the [`NotificationSender`] seam, its SES implementation and
//! the templates used by the password reset flow.

use async_trait::async_trait;
use aws_config::{timeout::TimeoutConfig, BehaviorVersion};
use aws_sdk_sesv2::config::Region;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use aws_sdk_sesv2::Client as SesClient;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::common::config::MailConfig;
use crate::common::safe_email_log;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Failed to build message: {0}")]
    InvalidMessage(String),

    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),
}

/// A rendered email ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), NotificationError>;
}

/// Delivers through AWS SES v2.
#[derive(Debug, Clone)]
pub struct SesNotificationSender {
    client: SesClient,
    from_email: String,
}

impl SesNotificationSender {
    pub async fn new(config: &MailConfig, timeout: Duration) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(timeout)
                    .connect_timeout(Duration::from_secs(5))
                    .build(),
            )
            .load()
            .await;

        Self {
            client: SesClient::new(&aws_config),
            from_email: config.from_email.clone(),
        }
    }
}

fn utf8_content(data: &str, part: &str) -> Result<Content, NotificationError> {
    Content::builder()
        .data(data)
        .charset("UTF-8")
        .build()
        .map_err(|e| NotificationError::InvalidMessage(format!("{}: {}", part, e)))
}

#[async_trait]
impl NotificationSender for SesNotificationSender {
    async fn send(&self, email: OutgoingEmail) -> Result<(), NotificationError> {
        let destination = Destination::builder()
            .to_addresses(email.to.clone())
            .build();

        let body = Body::builder()
            .html(utf8_content(&email.html_body, "html body")?)
            .text(utf8_content(&email.text_body, "text body")?)
            .build();

        let message = Message::builder()
            .subject(utf8_content(&email.subject, "subject")?)
            .body(body)
            .build();

        let result = self
            .client
            .send_email()
            .from_email_address(&self.from_email)
            .destination(destination)
            .content(EmailContent::builder().simple(message).build())
            .send()
            .await
            .map_err(|e| NotificationError::DeliveryFailed(e.to_string()))?;

        info!(
            to = %safe_email_log(&email.to),
            message_id = ?result.message_id(),
            "Email sent successfully via SES"
        );

        Ok(())
    }
}

/// Used when SES is not configured. Drops the message with a warning; the
/// message body is never logged because it may contain a reset secret.
#[derive(Debug, Default, Clone)]
pub struct DisabledNotificationSender;

#[async_trait]
impl NotificationSender for DisabledNotificationSender {
    async fn send(&self, email: OutgoingEmail) -> Result<(), NotificationError> {
        warn!(
            to = %safe_email_log(&email.to),
            subject = %email.subject,
            "Email delivery not configured, message dropped"
        );
        Ok(())
    }
}

pub(crate) fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn wrap_html(title: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <style>
        body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; }}
        .container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
        .header {{ background-color: #1E3A8A; color: white; padding: 20px; text-align: center; }}
        .content {{ padding: 20px; background-color: #f9f9f9; }}
        .footer {{ padding: 20px; text-align: center; font-size: 12px; color: #666; }}
        .button {{ display: inline-block; padding: 12px 24px; background-color: #1E3A8A; color: white; text-decoration: none; border-radius: 5px; margin: 10px 0; }}
    </style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>{}</h1>
        </div>
        <div class="content">
            {}
        </div>
        <div class="footer">
            <p>This is an automated message. Please do not reply directly to this email.</p>
        </div>
    </div>
</body>
</html>"#,
        title, content
    )
}

/// Reset-link email. `reset_url` embeds the raw secret.
pub fn password_reset_email(
    to: &str,
    display_name: Option<&str>,
    reset_url: &str,
    ttl_minutes: i64,
) -> OutgoingEmail {
    let greeting = display_name.unwrap_or("there");
    let html_content = format!(
        r#"<p>Hi {},</p>
            <p>We received a request to reset the password for your client portal account.</p>
            <p><a class="button" href="{}">Reset your password</a></p>
            <p>This link expires in {} minutes and can only be used once.</p>
            <p>If you did not request a reset, you can safely ignore this email.</p>"#,
        escape_html(greeting),
        escape_html(reset_url),
        ttl_minutes
    );

    let text_body = format!(
        "Hi {},\n\n\
         We received a request to reset the password for your client portal account.\n\n\
         Reset your password: {}\n\n\
         This link expires in {} minutes and can only be used once.\n\n\
         If you did not request a reset, you can safely ignore this email.",
        greeting, reset_url, ttl_minutes
    );

    OutgoingEmail {
        to: to.to_string(),
        subject: "Reset your portal password".to_string(),
        html_body: wrap_html("Password Reset", &html_content),
        text_body,
    }
}

pub fn password_changed_email(to: &str, display_name: Option<&str>) -> OutgoingEmail {
    let greeting = display_name.unwrap_or("there");
    let html_content = format!(
        r#"<p>Hi {},</p>
            <p>The password for your client portal account was just changed.</p>
            <p>If this wasn't you, contact support immediately.</p>"#,
        escape_html(greeting)
    );

    OutgoingEmail {
        to: to.to_string(),
        subject: "Your portal password was changed".to_string(),
        html_body: wrap_html("Password Changed", &html_content),
        text_body: format!(
            "Hi {},\n\nThe password for your client portal account was just changed.\n\n\
             If this wasn't you, contact support immediately.",
            greeting
        ),
    }
}
