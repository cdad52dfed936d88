// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! C6 Notifier: formats and sends terminal-transition emails through a
//! swappable mail-sending adapter.

pub mod adapter;
pub mod error;
pub mod notifier;
pub mod smtp;

pub use adapter::{Attachment, Message, NotifyAdapter};
pub use error::NotifyError;
pub use notifier::Notifier;
pub use smtp::SmtpNotifier;

#[cfg(any(test, feature = "test-support"))]
pub use adapter::FakeNotifyAdapter;
