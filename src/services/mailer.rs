//! Out-of-band delivery of credentials and reset codes.

use async_trait::async_trait;

use crate::error::Result;

/// A message to a single recipient.
#[derive(Clone)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

redacted_debug!(OutboundEmail {
    show to,
    show subject,
    redact body,
});

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutboundEmail) -> Result<()>;
}

/// Writes messages to the structured log instead of sending them. Bodies carry
/// credentials and are only emitted at debug level.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutboundEmail) -> Result<()> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            "Outbound email (log transport)"
        );
        tracing::debug!(to = %email.to, body = %email.body, "Outbound email body");
        Ok(())
    }
}

pub fn welcome_email(to: &str, password: &str) -> OutboundEmail {
    OutboundEmail {
        to: to.to_string(),
        subject: "Your Page Keeper account".to_string(),
        body: format!(
            "An account has been created for you.\n\nEmail: {}\nTemporary password: {}\n\n\
             Sign in and reset your password at your earliest convenience.",
            to, password
        ),
    }
}

pub fn reset_code_email(to: &str, code: &str, ttl_minutes: i64) -> OutboundEmail {
    OutboundEmail {
        to: to.to_string(),
        subject: "Your password reset code".to_string(),
        body: format!(
            "Your password reset code is {}.\n\nIt expires in {} minutes and can be used once.",
            code, ttl_minutes
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_body() {
        let email = reset_code_email("a@example.com", "123456", 10);
        let output = format!("{:?}", email);
        assert!(output.contains("a@example.com"));
        assert!(!output.contains("123456"));
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_log_mailer_keeps_credentials_out_of_info_logs() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        tracing::subscriber::with_default(subscriber, || {
            runtime
                .block_on(LogMailer.send(welcome_email("a@example.com", "Secret!Pass1")))
                .unwrap();
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("a@example.com"));
        assert!(!output.contains("Secret!Pass1"));
    }

    #[tokio::test]
    async fn test_log_mailer_accepts_messages() {
        LogMailer
            .send(welcome_email("a@example.com", "Secret!Pass1"))
            .await
            .unwrap();
    }
}
