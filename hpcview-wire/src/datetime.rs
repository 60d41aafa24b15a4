//! Binary timestamps.
//!
//! 100 ns ticks since 0001-01-01T00:00:00 in the low 62 bits, the kind in the
//! top two bits. Written as UTC (`01`); any kind is accepted on read.

use chrono::{DateTime, Utc};
use hpcview_core::error::WireError;

/// Ticks between 0001-01-01 and the Unix epoch.
pub const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;
/// Last tick of 9999-12-31.
pub const MAX_TICKS: i64 = 3_155_378_975_999_999_999;
pub const TICKS_PER_SECOND: i64 = 10_000_000;

const KIND_UTC: i64 = 1 << 62;
const TICKS_MASK: i64 = 0x3FFF_FFFF_FFFF_FFFF;

pub fn to_ticks(dt: &DateTime<Utc>) -> i64 {
    let secs = dt.timestamp();
    let sub = i64::from(dt.timestamp_subsec_nanos()) / 100;
    secs.saturating_mul(TICKS_PER_SECOND)
        .saturating_add(sub + UNIX_EPOCH_TICKS)
        .clamp(0, MAX_TICKS)
}

pub fn from_ticks(ticks: i64) -> Option<DateTime<Utc>> {
    if !(0..=MAX_TICKS).contains(&ticks) {
        return None;
    }
    let unix = ticks - UNIX_EPOCH_TICKS;
    let secs = unix.div_euclid(TICKS_PER_SECOND);
    let nanos = (unix.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
    DateTime::from_timestamp(secs, nanos)
}

pub fn to_binary(dt: &DateTime<Utc>) -> i64 {
    to_ticks(dt) | KIND_UTC
}

pub fn from_binary(binary: i64) -> Result<DateTime<Utc>, WireError> {
    from_ticks(binary & TICKS_MASK).ok_or(WireError::InvalidTimestamp { binary })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_unix_epoch() {
        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        assert_eq!(to_ticks(&epoch), UNIX_EPOCH_TICKS);
        assert_eq!(to_binary(&epoch) >> 62, 1);
        assert_eq!(from_binary(to_binary(&epoch)).unwrap(), epoch);
    }

    #[test]
    fn test_local_kind_accepted() {
        let dt = Utc.with_ymd_and_hms(2024, 2, 29, 12, 30, 0).unwrap();
        let local_kind = to_ticks(&dt) | (2i64 << 62);
        assert_eq!(from_binary(local_kind).unwrap(), dt);
    }

    #[test]
    fn test_out_of_range_ticks_rejected() {
        let binary = (MAX_TICKS + 1) | KIND_UTC;
        assert_eq!(
            from_binary(binary).unwrap_err(),
            WireError::InvalidTimestamp { binary }
        );
    }

    #[test]
    fn test_sub_tick_precision_truncated() {
        let dt = Utc.timestamp_opt(1, 150).unwrap();
        assert_eq!(from_ticks(to_ticks(&dt)).unwrap(), Utc.timestamp_opt(1, 100).unwrap());
    }
}
