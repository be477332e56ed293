//! Lifecycle events emitted while updating and installing packages.
//!
//! The UI layer observes progress through an [`EventSink`]. Sinks must not
//! fail; a closed channel simply drops events.

use std::sync::mpsc::Sender;

use tracing::info;

/// A lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// An update of the named package is starting.
    ExtensionWillUpdate { name: String },
    /// The named package was updated.
    ExtensionDidUpdate { name: String },
    /// A bundle is about to be installed.
    ExtensionWillInstall { name: String },
    /// A bundle was installed.
    ExtensionDidInstall { name: String },
    /// An archive download from `repository` is starting.
    RepositoryWillDownload { repository: String },
    /// An archive download finished.
    RepositoryDidDownload { repository: String, bytes: u64 },
}

impl LifecycleEvent {
    /// Short event name, stable across releases.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ExtensionWillUpdate { .. } => "extensionWillUpdate",
            Self::ExtensionDidUpdate { .. } => "extensionDidUpdate",
            Self::ExtensionWillInstall { .. } => "extensionWillInstall",
            Self::ExtensionDidInstall { .. } => "extensionDidInstall",
            Self::RepositoryWillDownload { .. } => "repositoryWillDownload",
            Self::RepositoryDidDownload { .. } => "repositoryDidDownload",
        }
    }
}

/// Receives lifecycle events.
pub trait EventSink: Send + Sync {
    /// Delivers one event.
    fn emit(&self, event: LifecycleEvent);
}

/// Discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: LifecycleEvent) {}
}

/// Writes events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: LifecycleEvent) {
        info!("[EVENT] {}: {:?}", event.name(), event);
    }
}

/// Forwards events over an mpsc channel.
#[derive(Debug)]
pub struct ChannelSink {
    sender: Sender<LifecycleEvent>,
}

impl ChannelSink {
    /// Creates a sink sending into `sender`.
    #[must_use]
    pub fn new(sender: Sender<LifecycleEvent>) -> Self {
        Self { sender }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: LifecycleEvent) {
        // Receiver may be gone
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_event_names() {
        let event = LifecycleEvent::ExtensionWillUpdate {
            name: "MyPkg".to_string(),
        };
        assert_eq!(event.name(), "extensionWillUpdate");
        let event = LifecycleEvent::RepositoryDidDownload {
            repository: "owner/repo".to_string(),
            bytes: 10,
        };
        assert_eq!(event.name(), "repositoryDidDownload");
    }

    #[test]
    fn test_channel_sink_delivers_in_order() {
        let (tx, rx) = mpsc::channel();
        let sink = ChannelSink::new(tx);

        sink.emit(LifecycleEvent::ExtensionWillInstall {
            name: "A".to_string(),
        });
        sink.emit(LifecycleEvent::ExtensionDidInstall {
            name: "A".to_string(),
        });

        let names: Vec<_> = rx.try_iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["extensionWillInstall", "extensionDidInstall"]);
    }

    #[test]
    fn test_channel_sink_shared_across_threads() {
        let (tx, rx) = mpsc::channel();
        let sink = std::sync::Arc::new(ChannelSink::new(tx));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let sink = sink.clone();
                std::thread::spawn(move || {
                    sink.emit(LifecycleEvent::ExtensionDidUpdate {
                        name: format!("P{}", i),
                    });
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        drop(sink);

        assert_eq!(rx.iter().count(), 4);
    }

    #[test]
    fn test_channel_sink_ignores_closed_receiver() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        ChannelSink::new(tx).emit(LifecycleEvent::ExtensionDidUpdate {
            name: "A".to_string(),
        });
    }
}
