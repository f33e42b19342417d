use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::model::RosterChange;

const FEED_CAPACITY: usize = 256;

/// Fans roster changes out to every connected board.
#[derive(Clone)]
pub struct RosterFeed {
    tx: broadcast::Sender<RosterChange>,
}

impl RosterFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RosterChange> {
        self.tx.subscribe()
    }

    /// Publishes a change. Having no subscribers is not an error.
    pub fn publish(&self, change: RosterChange) {
        debug!(?change, "publishing roster change");
        let _ = self.tx.send(change);
    }
}

impl Default for RosterFeed {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn ws_upgrade(
    State(feed): State<RosterFeed>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| relay_changes(socket, feed))
}

/// Forwards every change as a JSON text frame until the socket closes.
async fn relay_changes(socket: WebSocket, feed: RosterFeed) {
    let (mut sender, mut receiver) = socket.split();
    let mut changes = feed.subscribe();

    loop {
        tokio::select! {
            result = changes.recv() => {
                let change = match result {
                    Ok(change) => change,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("roster subscriber lagged by {} changes, asking for a resync", n);
                        RosterChange::Resync
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                let text = match serde_json::to_string(&change) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("failed to encode roster change: {}", e);
                        continue;
                    }
                };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    // Pings are answered by axum; nothing else is expected from the page.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    debug!("roster subscriber disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BoardSettings;

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let feed = RosterFeed::new();
        let mut first = feed.subscribe();
        let mut second = feed.subscribe();

        feed.publish(RosterChange::Removed { id: 3 });

        assert_eq!(first.recv().await.ok(), Some(RosterChange::Removed { id: 3 }));
        assert_eq!(second.recv().await.ok(), Some(RosterChange::Removed { id: 3 }));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let feed = RosterFeed::new();
        feed.publish(RosterChange::Cleared);

        // Late subscribers only see what comes after them.
        let mut late = feed.subscribe();
        let settings = BoardSettings {
            registration_limit: true,
        };
        feed.publish(RosterChange::SettingsChanged(settings));
        assert_eq!(
            late.recv().await.ok(),
            Some(RosterChange::SettingsChanged(settings))
        );
    }

    #[tokio::test]
    async fn test_resubscribe_after_disconnect() {
        let feed = RosterFeed::new();
        let first = feed.subscribe();
        drop(first);

        // Changes published while nobody listens are not replayed to a new subscriber.
        feed.publish(RosterChange::Removed { id: 1 });
        let mut again = feed.subscribe();
        feed.publish(RosterChange::Removed { id: 2 });
        assert_eq!(again.recv().await.ok(), Some(RosterChange::Removed { id: 2 }));
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags() {
        let feed = RosterFeed::new();
        let mut slow = feed.subscribe();
        for id in 0..(FEED_CAPACITY as i32 + 10) {
            feed.publish(RosterChange::Removed { id });
        }
        assert!(matches!(
            slow.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
    }
}
