// SPDX-License-Identifier: MIT OR Apache-2.0
//! Streak computation (§4.7): `prev_streak + 1` on passed/cached, `0` on
//! failed, unchanged on skipped/blocked.

use sykli_scheduler::TaskStatus;

pub fn next_streak(prev_streak: u32, status: TaskStatus) -> u32 {
    match status {
        TaskStatus::Passed | TaskStatus::Cached => prev_streak + 1,
        TaskStatus::Failed => 0,
        TaskStatus::Skipped | TaskStatus::Blocked => prev_streak,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_and_cache_hit_extend_the_streak() {
        assert_eq!(next_streak(3, TaskStatus::Passed), 4);
        assert_eq!(next_streak(3, TaskStatus::Cached), 4);
    }

    #[test]
    fn failure_resets_to_zero() {
        assert_eq!(next_streak(5, TaskStatus::Failed), 0);
    }

    #[test]
    fn skip_and_block_hold_the_streak_steady() {
        assert_eq!(next_streak(5, TaskStatus::Skipped), 5);
        assert_eq!(next_streak(5, TaskStatus::Blocked), 5);
    }

    #[test]
    fn a_fresh_task_starts_from_zero() {
        assert_eq!(next_streak(0, TaskStatus::Passed), 1);
    }
}
