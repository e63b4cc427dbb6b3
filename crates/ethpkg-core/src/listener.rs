//! Listener trait for progress and state events
//!
//! Core logic reports what it is doing through this trait without being
//! coupled to a terminal or GUI. Listeners are observational only: nothing
//! they do can change the outcome of the operation that emitted the event.

use std::sync::Arc;

/// A progress or state change emitted by core operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A release spec is being resolved against a repository.
    ResolvingRelease { spec: String },
    /// Bytes received while downloading a release asset.
    DownloadProgress {
        url: String,
        current: u64,
        total: Option<u64>,
    },
    /// One entry was written to disk during extraction.
    ExtractProgress {
        path: String,
        current: usize,
        total: usize,
    },
    /// A signer is about to sign the package contents.
    Signing { address: String },
    /// A signature envelope was written into the package.
    Signed { path: String },
    /// A human-readable identity was resolved to an address.
    Resolved { name: String, address: String },
    /// Signature checks are starting.
    Verifying { signatures: usize },
    /// Verification finished.
    Verified { is_valid: bool, is_trusted: bool },
}

impl Event {
    /// Stable event name, e.g. for logging or forwarding to a UI.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ResolvingRelease { .. } => "resolving_release",
            Self::DownloadProgress { .. } => "download_progress",
            Self::ExtractProgress { .. } => "extract_progress",
            Self::Signing { .. } => "signing",
            Self::Signed { .. } => "signed",
            Self::Resolved { .. } => "resolved",
            Self::Verifying { .. } => "verifying",
            Self::Verified { .. } => "verified",
        }
    }
}

pub trait Listener: Send + Sync {
    /// Receive one event.
    fn on_event(&self, event: &Event);
}

impl<T: Listener + ?Sized> Listener for Arc<T> {
    fn on_event(&self, event: &Event) {
        (**self).on_event(event);
    }
}

/// A no-op listener for silent operations (e.g., verification, testing).
#[derive(Debug, Clone, Copy)]
pub struct NullListener;

impl Listener for NullListener {
    fn on_event(&self, _: &Event) {}
}

/// Forwards every event to `tracing` at debug level.
#[derive(Debug, Clone, Copy)]
pub struct TracingListener;

impl Listener for TracingListener {
    fn on_event(&self, event: &Event) {
        tracing::debug!(event = event.name(), ?event, "package event");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records events for assertions.
    #[derive(Default)]
    pub(crate) struct RecordingListener {
        pub(crate) events: Mutex<Vec<Event>>,
    }

    impl Listener for RecordingListener {
        fn on_event(&self, event: &Event) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn arc_forwards_events() {
        let inner = Arc::new(RecordingListener::default());
        let listener: Arc<dyn Listener> = inner.clone();
        listener.on_event(&Event::Signed {
            path: "_META_/_sig_x.json".to_string(),
        });
        assert_eq!(inner.events.lock().unwrap().len(), 1);
    }

    #[test]
    fn event_names_are_stable() {
        let event = Event::ExtractProgress {
            path: "a".to_string(),
            current: 1,
            total: 2,
        };
        assert_eq!(event.name(), "extract_progress");
    }
}
