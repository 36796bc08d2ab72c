use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::debug;

/// A queued instruction telling the server which stored file to stream the
/// next time this client opens a send-type connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub server_path: PathBuf,
}

impl DownloadRequest {
    pub fn new(server_path: impl Into<PathBuf>) -> Self {
        Self {
            server_path: server_path.into(),
        }
    }
}

/// Per-client FIFO queues of pending download requests.
///
/// Clients are keyed by peer IP only; the ephemeral port of the file
/// connection differs from the one the request was made on. An external
/// producer enqueues, the connection handler dequeues, so access is
/// serialized behind one lock.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    queues: Mutex<HashMap<IpAddr, VecDeque<DownloadRequest>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, client: IpAddr, request: DownloadRequest) {
        debug!("queueing {:?} for {}", request.server_path, client);
        let mut queues = self.queues.lock().unwrap();
        queues.entry(client).or_default().push_back(request);
    }

    /// Pop the oldest pending request for this client, if any.
    pub fn dequeue(&self, client: IpAddr) -> Option<DownloadRequest> {
        let mut queues = self.queues.lock().unwrap();
        let queue = queues.get_mut(&client)?;
        let request = queue.pop_front();
        if queue.is_empty() {
            queues.remove(&client);
        }
        request
    }

    pub fn pending(&self, client: IpAddr) -> usize {
        let queues = self.queues.lock().unwrap();
        queues.get(&client).map_or(0, VecDeque::len)
    }
}
