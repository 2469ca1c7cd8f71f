//! Round-robin rotation and difficulty.
//!
//! Pure functions over the ordered masternode list. The creator of block
//! `n+1` is, in turn, the masternode after the creator of block `n`; anyone
//! else may still produce, at a difficulty reduced by their hop distance from
//! the in-turn position.

use posv_primitives::Address;

/// Outcome of a turn calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnInfo {
    /// Number of masternodes in the rotation.
    pub len: usize,
    /// Position of the parent block's creator, `-1` for the genesis parent
    /// or a creator that is no longer authorized.
    pub prev_index: i64,
    /// Position of the candidate, `-1` if not currently authorized.
    pub cur_index: i64,
    /// Whether the candidate is the in-turn producer.
    pub is_my_turn: bool,
}

/// Compute whose turn it is.
///
/// `prev_creator` is `None` when the parent is the genesis block, which by
/// convention puts position 0 in turn. A `-1` index in the result means the
/// corresponding address is not in the rotation at all; callers must treat
/// that as "cannot proceed", not as a distance.
pub fn your_turn(
    masternodes: &[Address],
    prev_creator: Option<Address>,
    candidate: Address,
) -> TurnInfo {
    let len = masternodes.len();
    let prev_index = match prev_creator {
        None => -1,
        Some(addr) => index_of(masternodes, addr),
    };
    let cur_index = index_of(masternodes, candidate);

    let is_my_turn = len > 0
        && cur_index >= 0
        && (prev_creator.is_none() || prev_index >= 0)
        && (prev_index + 1).rem_euclid(len as i64) == cur_index;

    TurnInfo {
        len,
        prev_index,
        cur_index,
        is_my_turn,
    }
}

/// Rotation distance from the in-turn position to the candidate, in
/// `[0, n-1]`. Zero means the candidate is exactly in turn.
pub fn hop(n: usize, prev_index: i64, cur_index: i64) -> u64 {
    debug_assert!(n > 0 && cur_index >= 0 && prev_index >= -1);
    if prev_index < cur_index {
        (cur_index - prev_index - 1) as u64
    } else if prev_index > cur_index {
        (n as i64 - prev_index + cur_index - 1) as u64
    } else {
        (n - 1) as u64
    }
}

/// Block difficulty: `n - hop`, in `[1, n]`. The in-turn producer claims the
/// maximum, so heavier chains are the ones produced closest to schedule.
pub fn calc_difficulty(n: usize, prev_index: i64, cur_index: i64) -> u64 {
    n as u64 - hop(n, prev_index, cur_index)
}

fn index_of(masternodes: &[Address], addr: Address) -> i64 {
    masternodes
        .iter()
        .position(|m| *m == addr)
        .map_or(-1, |i| i as i64)
}
