//! Notifications to admins and subscriber chats.
//!
//! Components build structured [`Notice`]s and enqueue them on a
//! [`DeliveryHandle`]. A [`DeliveryWorker`] renders and sends them through a
//! [`Notifier`] transport, reporting failures on a separate channel.

mod log;
mod notice;
mod queue;
mod telegram;
mod types;

use std::sync::Arc;

use crate::config::NotifyConfig;

pub use log::LogNotifier;
pub use notice::{format_hashtags, Notice, FORCE_COMMAND, SWITCH_COMMAND};
pub use queue::{create_delivery_system, Delivery, DeliveryFailure, DeliveryHandle, DeliveryWorker};
pub use telegram::TelegramNotifier;
pub use types::*;

/// Build the configured transport, falling back to the log.
pub fn create_notifier(config: &NotifyConfig) -> Arc<dyn Notifier> {
    match &config.telegram {
        Some(telegram) => Arc::new(TelegramNotifier::new(telegram.clone())),
        None => Arc::new(LogNotifier),
    }
}
