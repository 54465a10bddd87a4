//! Outbound email seam for the `send_email` tool.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("invalid recipient \"{0}\"")]
    InvalidRecipient(String),

    #[error("{0}")]
    Transport(String),
}

/// Delivers outbound email on behalf of an agent.
pub trait Mailer: Send + Sync {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError>;
}

/// Default mailer: records the email in the log and reports success.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        if !to.contains('@') {
            return Err(MailError::InvalidRecipient(to.to_string()));
        }
        tracing::info!(to = %to, subject = %subject, bytes = body.len(), "Outbound email");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_mailer_checks_recipient() {
        assert!(LogMailer.send("ops@example.com", "Report", "all green").is_ok());
        let err = LogMailer.send("ops", "Report", "").unwrap_err();
        assert_eq!(err.to_string(), "invalid recipient \"ops\"");
    }
}
