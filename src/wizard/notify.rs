use std::sync::Mutex;

/// A user-facing message emitted by the wizard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Error(String),
    /// Non-blocking information, e.g. an enrichment lookup that found nothing.
    Info(String),
}

impl Notice {
    pub fn message(&self) -> &str {
        match self {
            Notice::Success(message) | Notice::Error(message) | Notice::Info(message) => message,
        }
    }
}

/// Receives notices; hosts render them as toasts, console lines, etc.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Default notifier for headless use: notices become log events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice {
            Notice::Success(message) => tracing::info!(%message, "wizard notice"),
            Notice::Error(message) => tracing::warn!(%message, "wizard error"),
            Notice::Info(message) => tracing::info!(%message, "wizard info"),
        }
    }
}

/// Keeps every notice in memory, for embedding hosts and tests.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .map(|notices| notices.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn errors(&self) -> Vec<String> {
        self.notices()
            .into_iter()
            .filter_map(|notice| match notice {
                Notice::Error(message) => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, notice: Notice) {
        match self.notices.lock() {
            Ok(mut notices) => notices.push(notice),
            Err(poisoned) => poisoned.into_inner().push(notice),
        }
    }
}
