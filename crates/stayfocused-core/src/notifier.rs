use std::sync::Arc;

use crate::events::Event;
use crate::host::Broadcaster;

/// Best-effort fan-out of [`Event`]s to every open recipient.
///
/// Closed or failing recipients are logged at debug level and skipped.
pub struct ChangeNotifier {
    broadcaster: Arc<dyn Broadcaster>,
}

impl ChangeNotifier {
    pub fn new(broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self { broadcaster }
    }

    /// Returns how many recipients accepted the event.
    pub async fn notify(&self, event: &Event) -> usize {
        let mut delivered = 0;
        for recipient in self.broadcaster.recipients().await {
            match self.broadcaster.send(&recipient, event).await {
                Ok(()) => delivered += 1,
                Err(e) => log::debug!("dropping event for {recipient}: {e}"),
            }
        }
        delivered
    }
}
