//! Timestamp precision shared by stored snapshots
//!
//! The state repository keeps timestamps to the microsecond. Snapshots and
//! freshly observed file times are cut to the same precision before they
//! are compared, so a value read back from storage equals the value that
//! was written.

use chrono::{DateTime, SubsecRound, Utc};

/// Fractional-second digits kept for stored timestamps
pub const STORED_SUBSEC_DIGITS: u16 = 6;

/// Truncates `dt` to the precision the state repository keeps
pub fn to_stored_precision(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.trunc_subsecs(STORED_SUBSEC_DIGITS)
}
