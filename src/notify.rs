use std::fmt;

use tokio::sync::mpsc;
use tracing::{info, warn};

/// Outcome classification pushed to the admin channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    UploadOk,
    UploadFail,
    DownloadOk,
    DownloadFail,
}

impl EventKind {
    pub fn is_failure(self) -> bool {
        matches!(self, EventKind::UploadFail | EventKind::DownloadFail)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::UploadOk => "UPLOAD_OK",
            EventKind::UploadFail => "UPLOAD_FAIL",
            EventKind::DownloadOk => "DOWNLOAD_OK",
            EventKind::DownloadFail => "DOWNLOAD_FAIL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct TransferEvent {
    pub kind: EventKind,
    pub message: String,
}

/// Fire-and-forget handle to the admin status channel.
///
/// Sessions report outcomes through this and never wait on delivery;
/// a vanished receiver is ignored.
#[derive(Clone)]
pub struct AdminNotifier {
    tx: mpsc::UnboundedSender<TransferEvent>,
}

impl AdminNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransferEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn notify(&self, kind: EventKind, message: impl Into<String>) {
        let _ = self.tx.send(TransferEvent {
            kind,
            message: message.into(),
        });
    }
}

/// Drain events into the log. Stands in for the external admin transport,
/// which consumes the same receiver in production.
pub async fn log_events(mut rx: mpsc::UnboundedReceiver<TransferEvent>) {
    while let Some(event) = rx.recv().await {
        if event.kind.is_failure() {
            warn!("[{}] {}", event.kind, event.message);
        } else {
            info!("[{}] {}", event.kind, event.message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notify_delivers_in_order() {
        let (notifier, mut rx) = AdminNotifier::new();
        notifier.notify(EventKind::UploadOk, "a.txt uploaded");
        notifier.notify(EventKind::DownloadFail, "b.txt failed");

        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, EventKind::UploadOk);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.kind, EventKind::DownloadFail);
        assert!(second.kind.is_failure());
    }

    #[test]
    fn notify_without_receiver_is_silent() {
        let (notifier, rx) = AdminNotifier::new();
        drop(rx);
        notifier.notify(EventKind::UploadOk, "nobody listening");
    }
}
