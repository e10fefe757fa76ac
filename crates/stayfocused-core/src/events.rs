use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::focus::BlockMode;

/// Every state change that open UI surfaces may care about produces an Event.
/// Events are pushed through the [`ChangeNotifier`](crate::ChangeNotifier);
/// delivery is best-effort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    FocusModeStarted {
        mode: BlockMode,
        #[serde(rename = "startTime")]
        start_time: DateTime<Utc>,
        #[serde(rename = "endTime")]
        end_time: Option<DateTime<Utc>>,
    },
    /// Explicit stop by the user.
    FocusModeStopped { at: DateTime<Utc> },
    /// The scheduled end time was reached.
    FocusModeEnded {
        #[serde(rename = "endTime")]
        end_time: DateTime<Utc>,
    },
    /// A suite toggle (ad blocker, focus panel, ...) changed.
    ToggleUpdate { key: String, value: bool },
}
