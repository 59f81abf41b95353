mod error;
pub use error::TimeError;
use serde::{Deserialize, Serialize};
use std::convert::TryInto;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Timestamp with second resolution, counted from the UNIX epoch.
///
/// Block timestamps, slot times and transaction expirations are all `UTime`.
/// `UTime(0)` is the sentinel for "no time" (slot zero).
#[derive(
    Debug, Clone, Copy, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct UTime(u64);

impl fmt::Display for UTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_seconds())
    }
}

impl From<u64> for UTime {
    fn from(value: u64) -> Self {
        UTime(value)
    }
}

impl From<UTime> for Duration {
    fn from(value: UTime) -> Self {
        Duration::from_secs(value.to_seconds())
    }
}

impl UTime {
    /// Current wall-clock time, truncated to seconds.
    pub fn now() -> Result<Self, TimeError> {
        Ok(UTime(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_err(|_| TimeError::TimeOverflowError)?
                .as_secs(),
        ))
    }

    pub fn to_seconds(self) -> u64 {
        self.0
    }

    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn from_be_bytes(data: &[u8; 8]) -> Self {
        UTime(u64::from_be_bytes(*data))
    }

    pub fn saturating_sub(self, t: UTime) -> Self {
        UTime(self.0.saturating_sub(t.0))
    }

    pub fn saturating_add(self, t: UTime) -> Self {
        UTime(self.0.saturating_add(t.0))
    }

    pub fn checked_sub(self, t: UTime) -> Result<Self, TimeError> {
        self.0
            .checked_sub(t.0)
            .ok_or_else(|| TimeError::CheckedOperationError("subtraction error".to_string()))
            .map(UTime)
    }

    pub fn checked_add(self, t: UTime) -> Result<Self, TimeError> {
        self.0
            .checked_add(t.0)
            .ok_or_else(|| TimeError::CheckedOperationError("addition error".to_string()))
            .map(UTime)
    }

    pub fn checked_mul(self, n: u64) -> Result<Self, TimeError> {
        self.0
            .checked_mul(n)
            .ok_or_else(|| TimeError::CheckedOperationError("multiplication error".to_string()))
            .map(UTime)
    }

    /// Number of whole `t` intervals contained in `self`.
    pub fn checked_div_time(self, t: UTime) -> Result<u64, TimeError> {
        self.0
            .checked_div(t.0)
            .ok_or_else(|| TimeError::CheckedOperationError("division error".to_string()))
    }

    pub fn checked_rem_time(self, t: UTime) -> Result<Self, TimeError> {
        self.0
            .checked_rem(t.0)
            .ok_or_else(|| TimeError::CheckedOperationError("remainder error".to_string()))
            .map(UTime)
    }

    /// Largest interval-aligned time that is <= self.
    pub fn aligned_down(self, interval: UTime) -> Result<Self, TimeError> {
        let rem = self.checked_rem_time(interval)?;
        self.checked_sub(rem)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl TryInto<u32> for UTime {
    type Error = TimeError;

    fn try_into(self) -> Result<u32, TimeError> {
        self.0.try_into().map_err(|_| TimeError::ConversionError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_arithmetic() {
        let a: UTime = 1000.into();
        let b: UTime = 7.into();
        assert_eq!(a.checked_add(b).unwrap(), 1007.into());
        assert_eq!(a.checked_sub(b).unwrap(), 993.into());
        assert!(b.checked_sub(a).is_err());
        assert_eq!(a.checked_div_time(b).unwrap(), 142);
        assert_eq!(a.checked_rem_time(b).unwrap(), 6.into());
    }

    #[test]
    fn test_aligned_down() {
        let t: UTime = 1003.into();
        assert_eq!(t.aligned_down(3.into()).unwrap(), 1002.into());
        assert_eq!(t.aligned_down(1.into()).unwrap(), t);
        let aligned: UTime = 1000.into();
        assert_eq!(aligned.aligned_down(10.into()).unwrap(), aligned);
    }
}
