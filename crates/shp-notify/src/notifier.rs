// SPDX-License-Identifier: MIT

//! C6 Notifier: formats and sends the one email a terminal transition
//! produces (spec §4.7).

use std::sync::Arc;

use crate::adapter::{Attachment, Message, NotifyAdapter};
use crate::error::NotifyError;
use shp_core::model::WebExperiment;

pub struct Notifier {
    adapter: Arc<dyn NotifyAdapter>,
    admin_contact: String,
}

impl Notifier {
    pub fn new(adapter: Arc<dyn NotifyAdapter>, admin_contact: impl Into<String>) -> Self {
        Self { adapter, admin_contact: admin_contact.into() }
    }

    /// Send the terminal-transition notification for `xp`.
    ///
    /// `owner_email` is `None` when the owning account has been deleted
    /// out from under a still-running experiment. `queue_now_empty` tells
    /// the notifier whether this completion emptied the owner's remaining
    /// scheduled queue, to decide the "you're all done" variant.
    pub async fn notify_completion(
        &self,
        xp: &WebExperiment,
        owner_email: Option<&str>,
        queue_now_empty: bool,
    ) -> Result<(), NotifyError> {
        let had_errors = xp.had_errors();
        // On error the owner and the admin both get mailed (spec §8 scenario
        // 5); otherwise it's the owner alone, falling back to admin only
        // when the owning account has been deleted out from under the run.
        let mut recipients: Vec<String> = Vec::new();
        if had_errors {
            if let Some(email) = owner_email {
                recipients.push(email.to_string());
            }
            push_unique(&mut recipients, self.admin_contact.clone());
        } else {
            recipients.push(owner_email.map(str::to_string).unwrap_or_else(|| self.admin_contact.clone()));
        }

        let mut body = format!(
            "Experiment '{}' ({}) {}.\n\n{}",
            xp.experiment.name,
            xp.id,
            if had_errors { "finished with errors" } else { "finished successfully" },
            summary(xp),
        );
        if !had_errors && (xp.experiment.email_results || queue_now_empty) {
            body.push_str("\n\nYou're all done — no more experiments are scheduled for your account.");
        }

        let attachments = if had_errors {
            xp.terminal_output(true)
                .into_iter()
                .map(|(filename, body)| Attachment { filename, body })
                .collect()
        } else {
            Vec::new()
        };

        let message = Message {
            to: recipients,
            subject: format!("[shepherd] experiment {} {}", xp.id, if had_errors { "failed" } else { "finished" }),
            body,
            attachments,
        };
        self.adapter.send(&message).await
    }

    /// Sends the "herd rebooted" notice comparing the online set before and
    /// after a reboot (§4.5 reboot semantics).
    pub async fn notify_herd_rebooted(&self, before: &[String], after: &[String]) -> Result<(), NotifyError> {
        let went_offline: Vec<_> = before.iter().filter(|h| !after.contains(h)).cloned().collect();
        let body = format!(
            "The herd was rebooted.\nOnline before: {before:?}\nOnline after: {after:?}\nWent offline: {went_offline:?}"
        );
        let message = Message {
            to: vec![self.admin_contact.clone()],
            subject: "[shepherd] herd rebooted".to_string(),
            body,
            attachments: Vec::new(),
        };
        self.adapter.send(&message).await
    }
}

/// Pushes `email` onto `recipients` unless it's already present, so the
/// owner and admin contact being the same address doesn't double-send.
fn push_unique(recipients: &mut Vec<String>, email: String) {
    if !recipients.contains(&email) {
        recipients.push(email);
    }
}

fn summary(xp: &WebExperiment) -> String {
    let fmt = |ts: Option<chrono::DateTime<chrono::Utc>>| ts.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".to_string());
    format!(
        "- scheduled @ {} (UTC)\n- executed  @ {} (UTC)\n- finished  @ {} (UTC)",
        fmt(xp.started_at),
        fmt(xp.executed_at),
        fmt(xp.finished_at),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::FakeNotifyAdapter;
    use chrono::Utc;
    use shp_core::model::Experiment;

    fn finished_ok() -> WebExperiment {
        let mut xp = WebExperiment::submit("user@test.com", Experiment::builder().build(), Utc::now());
        xp.request_schedule(Utc::now()).unwrap();
        xp.claim(Utc::now(), vec!["obs1".to_string()]).unwrap();
        xp.observers_online = vec!["obs1".to_string()];
        xp.observers_had_data.insert("obs1".to_string(), true);
        xp.result_paths.insert("obs1".to_string(), "/tmp/r".into());
        xp.finish(Utc::now(), None, "log".to_string());
        xp
    }

    #[tokio::test]
    async fn mails_owner_on_clean_finish() {
        let fake = Arc::new(FakeNotifyAdapter::new());
        let notifier = Notifier::new(fake.clone(), "admin@test.com");
        let xp = finished_ok();
        notifier.notify_completion(&xp, Some("user@test.com"), false).await.unwrap();
        let sent = fake.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec!["user@test.com".to_string()]);
        assert!(sent[0].attachments.is_empty());
    }

    #[tokio::test]
    async fn mails_admin_on_missing_owner_even_without_errors() {
        let fake = Arc::new(FakeNotifyAdapter::new());
        let notifier = Notifier::new(fake.clone(), "admin@test.com");
        let xp = finished_ok();
        notifier.notify_completion(&xp, None, false).await.unwrap();
        assert_eq!(fake.sent()[0].to, vec!["admin@test.com".to_string()]);
    }

    #[tokio::test]
    async fn mails_both_owner_and_admin_on_error() {
        let fake = Arc::new(FakeNotifyAdapter::new());
        let notifier = Notifier::new(fake.clone(), "admin@test.com");
        let mut xp = finished_ok();
        xp.scheduler_error = Some("boom".to_string());
        notifier.notify_completion(&xp, Some("user@test.com"), false).await.unwrap();
        let sent = fake.sent();
        assert_eq!(sent[0].to, vec!["user@test.com".to_string(), "admin@test.com".to_string()]);
    }

    #[tokio::test]
    async fn mails_admin_only_on_error_when_owner_missing() {
        let fake = Arc::new(FakeNotifyAdapter::new());
        let notifier = Notifier::new(fake.clone(), "admin@test.com");
        let mut xp = finished_ok();
        xp.scheduler_error = Some("boom".to_string());
        notifier.notify_completion(&xp, None, false).await.unwrap();
        assert_eq!(fake.sent()[0].to, vec!["admin@test.com".to_string()]);
    }

    #[tokio::test]
    async fn attaches_transcripts_on_error() {
        let fake = Arc::new(FakeNotifyAdapter::new());
        let notifier = Notifier::new(fake.clone(), "admin@test.com");
        let mut xp = finished_ok();
        xp.scheduler_error = Some("boom".to_string());
        notifier.notify_completion(&xp, Some("user@test.com"), false).await.unwrap();
        let sent = fake.sent();
        assert_eq!(sent[0].to, vec!["user@test.com".to_string(), "admin@test.com".to_string()]);
        assert!(!sent[0].attachments.is_empty());
    }

    #[tokio::test]
    async fn appends_all_done_variant_when_queue_empties() {
        let fake = Arc::new(FakeNotifyAdapter::new());
        let notifier = Notifier::new(fake.clone(), "admin@test.com");
        let xp = finished_ok();
        notifier.notify_completion(&xp, Some("user@test.com"), true).await.unwrap();
        assert!(fake.sent()[0].body.contains("You're all done"));
    }
}
