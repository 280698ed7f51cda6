//! Per-entry expiration policies and access-driven extension

use chrono::{DateTime, Duration, Utc};

const DAY_SECONDS: i64 = 86_400;

/// When a cached value stops being served.
///
/// `estimated_expiry` maps every policy onto a concrete instant so that
/// liveness is always the single comparison `expiry > reference`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Expiration {
    /// Never expires; the estimated expiry is the far-future sentinel.
    Never,
    /// Expires the given number of seconds after the reference instant.
    Seconds(f64),
    /// Expires the given number of days after the reference instant.
    Days(u32),
    /// Expires at a fixed instant, independent of the reference.
    At(DateTime<Utc>),
    /// Already expired; the estimated expiry is the far-past sentinel.
    Expired,
}

impl Expiration {
    /// The instant this policy expires, measured from `reference`.
    pub fn estimated_expiry_from(&self, reference: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Expiration::Never => DateTime::<Utc>::MAX_UTC,
            Expiration::Seconds(seconds) => saturating_after(reference, *seconds),
            Expiration::Days(days) => {
                let delta = Duration::seconds(i64::from(*days) * DAY_SECONDS);
                reference
                    .checked_add_signed(delta)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC)
            }
            Expiration::At(instant) => *instant,
            Expiration::Expired => DateTime::<Utc>::MIN_UTC,
        }
    }

    /// The instant this policy expires, measured from now.
    pub fn estimated_expiry(&self) -> DateTime<Utc> {
        self.estimated_expiry_from(Utc::now())
    }

    /// Whether a value stored under this policy at `reference` is already
    /// dead at `reference`.
    pub fn is_expired_at(&self, reference: DateTime<Utc>) -> bool {
        self.estimated_expiry_from(reference) <= reference
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Signed time left until expiry; negative once past.
    pub fn remaining_from(&self, reference: DateTime<Utc>) -> Duration {
        self.estimated_expiry_from(reference)
            .signed_duration_since(reference)
    }
}

/// `reference + seconds` at microsecond precision, clamped to the
/// sentinels instead of panicking on overflow or non-finite input.
fn saturating_after(reference: DateTime<Utc>, seconds: f64) -> DateTime<Utc> {
    if seconds.is_nan() || seconds == f64::NEG_INFINITY {
        return DateTime::<Utc>::MIN_UTC;
    }
    if seconds == f64::INFINITY {
        return DateTime::<Utc>::MAX_UTC;
    }
    let micros = seconds * 1_000_000.0;
    if micros >= i64::MAX as f64 {
        return DateTime::<Utc>::MAX_UTC;
    }
    if micros <= i64::MIN as f64 {
        return DateTime::<Utc>::MIN_UTC;
    }
    reference
        .checked_add_signed(Duration::microseconds(micros as i64))
        .unwrap_or(if seconds >= 0.0 {
            DateTime::<Utc>::MAX_UTC
        } else {
            DateTime::<Utc>::MIN_UTC
        })
}

/// How a successful fetch refreshes the entry's expiry.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum AccessExtension {
    /// Leave the expiry untouched.
    None,
    /// Re-apply the entry's original lifetime from the access instant.
    #[default]
    PreserveDuration,
    /// Apply a different policy from the access instant.
    ResetTo(Expiration),
}
