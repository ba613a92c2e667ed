//! HTML summary email sent at the end of a run.

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::DriverSettings;
use crate::error::{DriverError, Result};
use crate::plan::EmailSettings;
use crate::report::{RunInfo, RunSummary};

/// Commit hashes that mean "no commit".
const NULL_COMMIT: &str = "00000000";

/// `[<env> <arch> - ]<subject> from <host>[ Commit <hash[..8]>]`
pub fn subject_line(subject: &str, info: &RunInfo) -> String {
    let environment = if info.environment.is_empty() {
        String::new()
    } else {
        format!("{} {} - ", info.environment, info.architecture)
    };
    let commit = match info.commit_hash.as_str() {
        "" | NULL_COMMIT => String::new(),
        hash => format!(" Commit {}", hash.get(..8).unwrap_or(hash)),
    };
    format!("{environment}{subject} from {}{commit}", info.hostname)
}

/// Best effort; falls back to `Unknown`.
pub fn hostname() -> String {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .chain(std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Sends run summaries over SMTP.
pub struct Mailer<'a> {
    email: &'a EmailSettings,
    settings: &'a DriverSettings,
}

impl<'a> Mailer<'a> {
    /// `None` unless subject, sender, SMTP host and recipients are all set.
    pub fn new(email: &'a EmailSettings, settings: &'a DriverSettings) -> Option<Self> {
        if !email.is_complete() {
            tracing::error!("Not sending email since all necessary email info was not provided");
            return None;
        }
        Some(Self { email, settings })
    }

    fn message(&self, summary: &RunSummary) -> Result<Message> {
        let (Some(subject), Some(sender)) = (&self.email.subject, &self.email.sender) else {
            return Err(DriverError::Email("incomplete email settings".into()));
        };
        let from: Mailbox = sender
            .parse()
            .map_err(|e| DriverError::Email(format!("bad sender {sender}: {e}")))?;
        let mut builder = Message::builder()
            .from(from)
            .subject(subject_line(subject, &summary.info))
            .header(ContentType::TEXT_HTML);
        for recipient in &self.email.recipients {
            let to: Mailbox = recipient
                .parse()
                .map_err(|e| DriverError::Email(format!("bad recipient {recipient}: {e}")))?;
            builder = builder.to(to);
        }
        builder
            .body(summary.to_html()?)
            .map_err(|e| DriverError::Email(e.to_string()))
    }

    pub async fn send(&self, summary: &RunSummary) -> Result<()> {
        let message = self.message(summary)?;
        let host = self.email.smtp.as_deref().unwrap_or_default();

        let mut transport = if self.settings.smtp_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| DriverError::Email(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        }
        .port(self.settings.smtp_port);

        if let (Some(user), Some(pass)) = (&self.settings.smtp_user, &self.settings.smtp_password) {
            transport = transport.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        transport
            .build()
            .send(message)
            .await
            .map_err(|e| DriverError::Email(e.to_string()))?;
        tracing::info!(recipients = self.email.recipients.len(), smtp = host, "summary email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{GroupMap, TestReport, TestSuite};

    fn info(commit: &str, environment: &str) -> RunInfo {
        RunInfo {
            name: "Verification".into(),
            commit_hash: commit.into(),
            environment: environment.into(),
            architecture: "x64".into(),
            hostname: "build01".into(),
        }
    }

    #[test]
    fn subject_with_everything() {
        assert_eq!(
            subject_line("Nightly", &info("0123456789abcdef", "Linux")),
            "Linux x64 - Nightly from build01 Commit 01234567"
        );
    }

    #[test]
    fn subject_without_commit_or_environment() {
        assert_eq!(subject_line("Nightly", &info("", "")), "Nightly from build01");
        assert_eq!(subject_line("Nightly", &info("00000000", "")), "Nightly from build01");
        assert_eq!(subject_line("Nightly", &info("abc", "")), "Nightly from build01 Commit abc");
    }

    #[test]
    fn incomplete_settings_send_nothing() {
        let settings = DriverSettings::default();
        let email = EmailSettings {
            subject: Some("Nightly".into()),
            ..Default::default()
        };
        assert!(Mailer::new(&email, &settings).is_none());
    }

    #[test]
    fn message_carries_html_report() {
        let settings = DriverSettings::default();
        let email = EmailSettings {
            subject: Some("Nightly".into()),
            sender: Some("ci@example.com".into()),
            smtp: Some("smtp.example.com".into()),
            recipients: vec!["a@example.com".into(), "b@example.com".into()],
        };
        let mut report = TestReport::new();
        report.add_suite(TestSuite::new("BasicStandardResults"));
        let summary = RunSummary::new(info("", ""), report, GroupMap::default());

        let mailer = Mailer::new(&email, &settings).unwrap();
        let raw = String::from_utf8(mailer.message(&summary).unwrap().formatted()).unwrap();
        assert!(raw.contains("Subject: Nightly from build01"));
        assert!(raw.contains("a@example.com") && raw.contains("b@example.com"));
        assert!(raw.contains("text/html"));
    }

    #[test]
    fn bad_recipient_is_an_error() {
        let settings = DriverSettings::default();
        let email = EmailSettings {
            subject: Some("Nightly".into()),
            sender: Some("ci@example.com".into()),
            smtp: Some("smtp.example.com".into()),
            recipients: vec!["not an address".into()],
        };
        let summary = RunSummary::new(info("", ""), TestReport::new(), GroupMap::default());
        let mailer = Mailer::new(&email, &settings).unwrap();
        assert!(matches!(mailer.message(&summary), Err(DriverError::Email(_))));
    }
}
