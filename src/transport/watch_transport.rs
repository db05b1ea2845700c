use log::debug;
use std::time::Duration;
use tokio::sync::watch;

use crate::error_handling::types::TransportError;
use crate::transport::transport_trait::{StateMessage, UiTransport};

/// Keeps only the most recent [`StateMessage`]; pollers wait for a newer sequence.
pub struct WatchTransport {
    sender: watch::Sender<StateMessage>,
}

impl WatchTransport {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(StateMessage::empty());
        Self { sender }
    }

    pub fn latest(&self) -> StateMessage {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StateMessage> {
        self.sender.subscribe()
    }

    /// Waits up to `timeout` for a message with a sequence above `after`, then
    /// returns whatever is latest.
    pub async fn wait_newer(&self, after: u64, timeout: Duration) -> StateMessage {
        let mut receiver = self.sender.subscribe();
        let newer = tokio::time::timeout(
            timeout,
            receiver.wait_for(|message| message.sequence > after),
        )
        .await;
        match newer {
            Ok(Ok(message)) => (*message).clone(),
            _ => self.latest(),
        }
    }
}

impl Default for WatchTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UiTransport for WatchTransport {
    fn post_state(&self, message: &StateMessage) -> Result<(), TransportError> {
        debug!(
            "Publishing state #{} with {} services to {} pollers",
            message.sequence,
            message.body.len(),
            self.sender.receiver_count()
        );
        self.sender.send_replace(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn posting_without_pollers_succeeds() {
        let transport = WatchTransport::new();
        assert!(transport.post_state(&StateMessage::new(1, Vec::new())).is_ok());
        assert_eq!(transport.latest().sequence, 1);
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_already_newer() {
        let transport = WatchTransport::new();
        transport.post_state(&StateMessage::new(3, Vec::new())).unwrap();
        let message = transport.wait_newer(2, Duration::from_secs(5)).await;
        assert_eq!(message.sequence, 3);
    }

    #[tokio::test]
    async fn wait_times_out_with_latest() {
        let transport = WatchTransport::new();
        let message = transport.wait_newer(0, Duration::from_millis(20)).await;
        assert_eq!(message.sequence, 0);
    }

    #[tokio::test]
    async fn wait_wakes_on_publish() {
        let transport = Arc::new(WatchTransport::new());
        let poller = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { transport.wait_newer(0, Duration::from_secs(5)).await })
        };
        tokio::task::yield_now().await;
        transport.post_state(&StateMessage::new(1, Vec::new())).unwrap();

        let message = poller.await.unwrap();
        assert_eq!(message.sequence, 1);
    }
}
