//! Termination predicate for the backward pagination chain.

/// A chain continues only while the cursor is present, has not hit the
/// bottom-of-channel sentinel (`1`), and is still at or above the floor
/// recorded before the chain began. The sentinel is a distinct case from
/// "no more pages": the service returns `1` for the very first post.
pub fn should_continue(next_offset: Option<i64>, end_offset: i64) -> bool {
    match next_offset {
        Some(next) => next != 1 && next >= end_offset,
        None => false,
    }
}
