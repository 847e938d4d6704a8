use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use log::{error, info, warn};
use serde::Serialize;

use crate::error::WorkflowError;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageLevel {
    Success,
    /// Dismissable, non-blocking
    Error,
    /// Must be acknowledged before the user can continue
    Blocking,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct UiMessage {
    pub level: MessageLevel,
    pub text: String,
}

impl UiMessage {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Error,
            text: text.into(),
        }
    }

    pub fn blocking(text: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Blocking,
            text: text.into(),
        }
    }
}

/// Outbound surface the views talk to after a transition.
pub trait ViewSignals: Send + Sync {
    fn show_message(&self, message: UiMessage);

    /// Asks whoever renders the view to reload its data
    fn refresh(&self);
}

/// Reports a failed action the way the views surface each error kind.
pub fn report_error(signals: &dyn ViewSignals, err: &WorkflowError) {
    match err {
        WorkflowError::ProfileIncomplete(msg) => signals.show_message(UiMessage::blocking(msg)),
        WorkflowError::RemoteFailure(_) => signals.show_message(UiMessage::error(
            "Something went wrong. Please try again.",
        )),
        other if other.requires_refresh() => {
            signals.show_message(UiMessage::error(
                "This item changed in the meantime. The list has been reloaded.",
            ));
            signals.refresh();
        }
        other => signals.show_message(UiMessage::error(other.to_string())),
    }
}

#[derive(Default)]
pub struct LogSignals;

impl ViewSignals for LogSignals {
    fn show_message(&self, message: UiMessage) {
        match message.level {
            MessageLevel::Success => info!("Message: {}", message.text),
            MessageLevel::Error => warn!("Message: {}", message.text),
            MessageLevel::Blocking => error!("Blocking message: {}", message.text),
        }
    }

    fn refresh(&self) {
        info!("Refresh requested");
    }
}

/// Logs and buffers messages so they can be returned with an HTTP response.
#[derive(Default, Clone)]
pub struct CollectedSignals {
    messages: Arc<Mutex<Vec<UiMessage>>>,
    refreshes: Arc<AtomicUsize>,
}

impl CollectedSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<UiMessage> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

impl ViewSignals for CollectedSignals {
    fn show_message(&self, message: UiMessage) {
        LogSignals.show_message(message.clone());
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message);
        }
    }

    fn refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_error_by_kind() {
        let signals = CollectedSignals::new();

        report_error(
            &signals,
            &WorkflowError::ProfileIncomplete("Add your phone number".into()),
        );
        report_error(&signals, &WorkflowError::NotFound("inv-1".into()));
        report_error(&signals, &WorkflowError::RemoteFailure("timeout".into()));

        let levels: Vec<MessageLevel> = signals.messages().iter().map(|m| m.level).collect();
        assert_eq!(
            levels,
            vec![MessageLevel::Blocking, MessageLevel::Error, MessageLevel::Error]
        );
        assert_eq!(signals.refresh_count(), 1);
        assert!(!signals.messages()[2].text.contains("timeout"));
    }
}
