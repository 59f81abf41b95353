//! Pure slot/time calculus. Slot numbers are relative to the current head:
//! slot 1 is the first block-interval-aligned time strictly after the head
//! block time.

use crate::error::ChainError;
use time::UTime;

/// Time at which relative slot `slot_num` occurs.
///
/// Slot 0 maps to the zero sentinel. For N > 0 the result is the Nth
/// interval-aligned time after `head_time` (the genesis timestamp while the
/// chain is empty, which is itself aligned).
pub fn get_slot_time(
    block_interval: UTime,
    head_time: UTime,
    slot_num: u32,
) -> Result<UTime, ChainError> {
    if slot_num == 0 {
        return Ok(UTime::default());
    }
    let head_slot_time = head_time.aligned_down(block_interval)?;
    Ok(head_slot_time.checked_add(block_interval.checked_mul(slot_num as u64)?)?)
}

/// Greatest N such that `get_slot_time(N) <= when`, or 0 if none.
pub fn get_slot_at_time(
    block_interval: UTime,
    head_time: UTime,
    when: UTime,
) -> Result<u32, ChainError> {
    let first_slot_time = get_slot_time(block_interval, head_time, 1)?;
    if when < first_slot_time {
        return Ok(0);
    }
    let elapsed = when.checked_sub(first_slot_time)?;
    Ok(elapsed.checked_div_time(block_interval)? as u32 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: u64 = 3;

    #[test]
    fn test_slot_zero_is_sentinel() {
        assert_eq!(
            get_slot_time(INTERVAL.into(), 900.into(), 0).unwrap(),
            UTime::default()
        );
    }

    #[test]
    fn test_slot_times_align_to_interval() {
        let head: UTime = 900.into();
        assert_eq!(get_slot_time(INTERVAL.into(), head, 1).unwrap(), 903.into());
        assert_eq!(get_slot_time(INTERVAL.into(), head, 5).unwrap(), 915.into());
        // head time inside a slot rounds down before stepping
        let off_head: UTime = 901.into();
        assert_eq!(
            get_slot_time(INTERVAL.into(), off_head, 1).unwrap(),
            903.into()
        );
    }

    #[test]
    fn test_slot_at_time_inverse() {
        let head: UTime = 900.into();
        for slot_num in 1u32..50 {
            let at = get_slot_time(INTERVAL.into(), head, slot_num).unwrap();
            assert_eq!(
                get_slot_at_time(INTERVAL.into(), head, at).unwrap(),
                slot_num
            );
        }
    }

    #[test]
    fn test_slot_at_time_before_first_slot() {
        let head: UTime = 900.into();
        assert_eq!(get_slot_at_time(INTERVAL.into(), head, 900.into()).unwrap(), 0);
        assert_eq!(get_slot_at_time(INTERVAL.into(), head, 902.into()).unwrap(), 0);
        // unaligned times map to the slot they fall into
        assert_eq!(get_slot_at_time(INTERVAL.into(), head, 904.into()).unwrap(), 1);
    }
}
