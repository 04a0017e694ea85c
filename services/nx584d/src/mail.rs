//! Email notification.
//!
//! Three notification classes, each with its own recipient list in the
//! config: system status flag changes, per-partition flag changes (filtered
//! through the partition's ignore list), and panel log events (with the
//! alarm-class events additionally going to the alarm recipients).
//!
//! Message building is pure; delivery runs on a spawned task so SMTP
//! latency never stalls the controller loop. Missing email config simply
//! disables the affected class.

use crate::config::{EmailConfig, GatewayConfig, PartitionNotifyConfig};
use lettre::message::Mailbox;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use nx_model::{LogEvent, Partition};
use std::collections::BTreeMap;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Outgoing message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
struct OutgoingMail {
    subject: String,
    recipients: Vec<String>,
    body: String,
}

#[derive(Debug, Clone, Copy)]
enum Recipients {
    Status,
    Alarm,
}

#[derive(Debug, thiserror::Error)]
enum MailError {
    #[error("bad address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("building message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("SMTP: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

// ---------------------------------------------------------------------------
// Mailer
// ---------------------------------------------------------------------------

/// Notification sender. Holds a snapshot of the email-relevant config.
pub struct Mailer {
    email: EmailConfig,
    partitions: BTreeMap<u8, PartitionNotifyConfig>,
}

impl Mailer {
    pub fn new(cfg: &GatewayConfig) -> Mailer {
        Mailer {
            email: cfg.email.clone(),
            partitions: cfg.partition_notify.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Notification entry points (called from controller handlers)
    // -----------------------------------------------------------------------

    pub fn notify_system(&self, deasserted: &[String], asserted: &[String]) {
        if let Some(mail) = self.system_mail(deasserted, asserted) {
            self.deliver(mail);
        }
    }

    pub fn notify_partition(
        &self,
        partition: &Partition,
        deasserted: &[String],
        asserted: &[String],
    ) {
        if let Some(mail) = self.partition_mail(partition, deasserted, asserted) {
            self.deliver(mail);
        }
    }

    /// Arm/disarm notices go to the partition's `status_flags` recipients;
    /// a siren coming on goes to its `alarm_flags` recipients.
    pub fn notify_partition_transitions(
        &self,
        partition: &Partition,
        deasserted: &[String],
        asserted: &[String],
    ) {
        self.notify_partition(partition, deasserted, asserted);
        let number = partition.number;
        if asserted.iter().any(|f| f == "Armed") {
            if let Some(mail) = self.partition_status_mail(
                partition,
                Recipients::Status,
                "armed",
                &format!("Partition {number} armed"),
            ) {
                self.deliver(mail);
            }
        } else if deasserted.iter().any(|f| f == "Armed") {
            if let Some(mail) = self.partition_status_mail(
                partition,
                Recipients::Status,
                "disarmed",
                &format!("Partition {number} disarmed"),
            ) {
                self.deliver(mail);
            }
        }
        if asserted.iter().any(|f| f == "Siren on" || f == "Steady siren on") {
            if let Some(mail) = self.partition_status_mail(
                partition,
                Recipients::Alarm,
                "ALARM",
                &format!("Partition {number} alarm"),
            ) {
                self.deliver(mail);
            }
        }
    }

    pub fn notify_log_event(&self, event: &LogEvent) {
        if let Some(mail) = self.log_event_mail(event) {
            self.deliver(mail);
        }
    }

    // -----------------------------------------------------------------------
    // Pure message builders
    // -----------------------------------------------------------------------

    fn system_mail(&self, deasserted: &[String], asserted: &[String]) -> Option<OutgoingMail> {
        if self.email.system.is_empty() {
            return None;
        }
        Some(OutgoingMail {
            subject: "Security System Alert".to_owned(),
            recipients: self.email.system.clone(),
            body: flag_change_body("Security System alert.", asserted, deasserted),
        })
    }

    fn partition_mail(
        &self,
        partition: &Partition,
        deasserted: &[String],
        asserted: &[String],
    ) -> Option<OutgoingMail> {
        let notify = self.partitions.get(&partition.number)?;
        if notify.flags.is_empty() {
            return None;
        }
        let keep = |flags: &[String]| -> Vec<String> {
            flags
                .iter()
                .filter(|f| !notify.ignore_flags.contains(*f))
                .cloned()
                .collect()
        };
        let asserted = keep(asserted);
        let deasserted = keep(deasserted);
        if asserted.is_empty() && deasserted.is_empty() {
            return None;
        }
        Some(OutgoingMail {
            subject: format!("Security System Partition {} Alert", partition.number),
            recipients: notify.flags.clone(),
            body: flag_change_body(
                &format!("Security System partition {} alert.", partition.number),
                &asserted,
                &deasserted,
            ),
        })
    }

    fn partition_status_mail(
        &self,
        partition: &Partition,
        recipients: Recipients,
        subject: &str,
        message: &str,
    ) -> Option<OutgoingMail> {
        let notify = self.partitions.get(&partition.number)?;
        let recipients = match recipients {
            Recipients::Status => &notify.status_flags,
            Recipients::Alarm => &notify.alarm_flags,
        };
        if recipients.is_empty() {
            return None;
        }
        Some(OutgoingMail {
            subject: format!("Security: {subject}"),
            recipients: recipients.clone(),
            body: format!("Security System alert:\n{message}"),
        })
    }

    fn log_event_mail(&self, event: &LogEvent) -> Option<OutgoingMail> {
        let name = event.event_name();
        let mut recipients = self.email.events.clone();
        if self.email.alarm_events.contains(&name) {
            for addr in &self.email.alarms {
                if !recipients.contains(addr) {
                    recipients.push(addr.clone());
                }
            }
        }
        if recipients.is_empty() {
            return None;
        }
        Some(OutgoingMail {
            subject: format!("Security: {name}"),
            recipients,
            body: format!("{} at {}", event.event_string(), event.timestamp),
        })
    }

    // -----------------------------------------------------------------------
    // Delivery
    // -----------------------------------------------------------------------

    fn deliver(&self, mail: OutgoingMail) {
        let (Some(fromaddr), Some(smtphost)) =
            (self.email.fromaddr.clone(), self.email.smtphost.clone())
        else {
            debug!("email not configured; notification dropped");
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = smtp_send(&smtphost, &fromaddr, &mail).await {
                warn!(error = %e, subject = %mail.subject, "notification email failed");
            }
        });
    }
}

fn flag_change_body(headline: &str, asserted: &[String], deasserted: &[String]) -> String {
    format!(
        "{headline}\n\n\
         The following new flags have been asserted:\n{}\n\n\
         The following flags are now de-asserted:\n{}\n",
        asserted.join(","),
        deasserted.join(",")
    )
}

async fn smtp_send(smtphost: &str, fromaddr: &str, mail: &OutgoingMail) -> Result<(), MailError> {
    let mut builder = Message::builder()
        .from(fromaddr.parse::<Mailbox>()?)
        .subject(mail.subject.clone());
    for addr in &mail.recipients {
        builder = builder.to(addr.parse::<Mailbox>()?);
    }
    let message = builder.body(mail.body.clone())?;
    // The panel network's relay is plain SMTP on the local segment.
    let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtphost).build();
    transport.send(message).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests (pure builders only; no SMTP traffic)
// ---------------------------------------------------------------------------
