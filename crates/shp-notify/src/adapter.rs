// SPDX-License-Identifier: MIT

//! Adapter seam for sending mail: a trait, an SMTP-backed real
//! implementation, and a fake for tests — the same shape as every other
//! adapter in this workspace.

use async_trait::async_trait;

use crate::error::NotifyError;

/// A plain-text file attached to a notification (terminal-output
/// transcripts, the scheduler log excerpt).
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub filename: String,
    pub body: String,
}

/// A fully-formed notification ready to send.
///
/// `to` is a list rather than a single mailbox because a terminal-transition
/// error notice goes to both the owner and the admin contact at once
/// (spec §8 scenario 5), not as two separate sends.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<Attachment>,
}

#[async_trait]
pub trait NotifyAdapter: Send + Sync + 'static {
    async fn send(&self, message: &Message) -> Result<(), NotifyError>;
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    pub struct FakeNotifyAdapter {
        inner: Arc<Mutex<Vec<Message>>>,
    }

    impl FakeNotifyAdapter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn sent(&self) -> Vec<Message> {
            self.inner.lock().clone()
        }
    }

    #[async_trait]
    impl NotifyAdapter for FakeNotifyAdapter {
        async fn send(&self, message: &Message) -> Result<(), NotifyError> {
            self.inner.lock().push(message.clone());
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeNotifyAdapter;
