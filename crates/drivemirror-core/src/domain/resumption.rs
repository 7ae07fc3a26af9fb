//! Delta resumption token slot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::DeltaToken;

/// The single stored delta token for the account, with the time it was saved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumptionToken {
    pub token: DeltaToken,
    pub last_synced_at: DateTime<Utc>,
}

impl ResumptionToken {
    pub fn new(token: DeltaToken) -> Self {
        Self {
            token,
            last_synced_at: Utc::now(),
        }
    }

    /// Replaces the token and refreshes the sync time
    #[must_use]
    pub fn with_token(self, token: DeltaToken) -> Self {
        Self {
            token,
            last_synced_at: Utc::now(),
        }
    }
}
