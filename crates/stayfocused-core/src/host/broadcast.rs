use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tokio::sync::mpsc;

use super::{Broadcaster, RecipientId};
use crate::error::HostApiError;
use crate::events::Event;

/// Broadcaster over per-recipient channels.
///
/// Each open UI context registers and gets the receiving end of an unbounded
/// channel. A recipient whose receiver was dropped is pruned on the next send
/// to it.
#[derive(Default)]
pub struct ChannelBroadcaster {
    senders: Mutex<BTreeMap<RecipientId, mpsc::UnboundedSender<Event>>>,
}

impl ChannelBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id`, replacing any previous registration under it.
    pub fn register(&self, id: impl Into<RecipientId>) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut senders) = self.senders.lock() {
            senders.insert(id.into(), tx);
        }
        rx
    }

    pub fn unregister(&self, id: &str) -> bool {
        self.senders
            .lock()
            .map(|mut senders| senders.remove(id).is_some())
            .unwrap_or(false)
    }
}

#[async_trait]
impl Broadcaster for ChannelBroadcaster {
    async fn recipients(&self) -> Vec<RecipientId> {
        self.senders
            .lock()
            .map(|senders| senders.keys().cloned().collect())
            .unwrap_or_default()
    }

    async fn send(&self, recipient: &RecipientId, event: &Event) -> Result<(), HostApiError> {
        let mut senders = self.senders.lock().map_err(|_| HostApiError::Delivery {
            recipient: recipient.clone(),
            message: "recipient table mutex poisoned".into(),
        })?;
        let Some(tx) = senders.get(recipient) else {
            return Err(HostApiError::Delivery {
                recipient: recipient.clone(),
                message: "no such recipient".into(),
            });
        };
        if tx.send(event.clone()).is_err() {
            senders.remove(recipient);
            return Err(HostApiError::Delivery {
                recipient: recipient.clone(),
                message: "receiver closed".into(),
            });
        }
        Ok(())
    }
}
