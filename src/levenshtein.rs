// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Bounded edit distance with an early-exit optimization.
//!
//! The key insight: `|len(a) - len(b)|` is a lower bound on edit distance.
//! If two strings differ in length by more than the threshold, skip the
//! O(nm) DP entirely. This catches most non-matches before allocating
//! anything.

/// Compute the edit distance between `a` and `b` if it is at most `max`.
///
/// Returns `None` when the distance exceeds `max`. Two early-exit paths:
/// 1. If the length difference exceeds `max`, bail before the DP.
/// 2. If the minimum value in a DP row exceeds `max`, abandon the DP.
///
/// Both are sound - the row minimum is monotonically non-decreasing.
pub fn bounded_levenshtein(a: &str, b: &str, max: usize) -> Option<usize> {
    // Character counts, not byte lengths, for Unicode correctness.
    let a_len = a.chars().count();
    let b_len = b.chars().count();

    if a_len.abs_diff(b_len) > max {
        return None;
    }
    if a_len == 0 {
        return Some(b_len); // b_len <= max by the check above
    }

    let mut dp: Vec<usize> = (0..=b_len).collect();
    for (i, ac) in a.chars().enumerate() {
        let mut prev = dp[0];
        dp[0] = i + 1;
        let mut min_row = dp[0];

        for (j, bc) in b.chars().enumerate() {
            let temp = dp[j + 1];
            let cost = if ac == bc { 0 } else { 1 };
            dp[j + 1] = (dp[j + 1] + 1).min(dp[j] + 1).min(prev + cost);
            prev = temp;
            if dp[j + 1] < min_row {
                min_row = dp[j + 1];
            }
        }

        if min_row > max {
            return None;
        }
    }

    if dp[b_len] <= max {
        Some(dp[b_len])
    } else {
        None
    }
}

/// Are these strings within `max` edits of each other?
pub fn levenshtein_within(a: &str, b: &str, max: usize) -> bool {
    bounded_levenshtein(a, b, max).is_some()
}
