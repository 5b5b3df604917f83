// SPDX-License-Identifier: MIT OR Apache-2.0
//! Verification tallying (§3's Run data model). No peer mesh is
//! implemented in this engine, so every verification-eligible task that
//! actually ran is, per the strict-mode resolution, a `skipped` entry
//! rather than a silent pass — a reader can always tell "nothing verified
//! this" apart from "verification passed."

use sykli_core::{Graph, VerifyPolicy};
use sykli_scheduler::TaskStatus;

use crate::record::VerificationSummary;

fn is_eligible(policy: Option<VerifyPolicy>) -> bool {
    matches!(policy, Some(VerifyPolicy::Always) | Some(VerifyPolicy::CrossPlatform))
}

/// Tally verification outcomes for this run's tasks against `graph`'s
/// declared `verify` policies.
pub fn summarize<'a>(graph: &Graph, tasks: impl Iterator<Item = (&'a str, TaskStatus)>) -> VerificationSummary {
    let mut summary = VerificationSummary::default();
    for (name, status) in tasks {
        let ran = matches!(status, TaskStatus::Passed | TaskStatus::Cached | TaskStatus::Failed);
        if !ran {
            continue;
        }
        if !is_eligible(graph.task(name).and_then(|t| t.verify)) {
            continue;
        }
        summary.entries += 1;
        summary.skipped += 1;
    }
    summary
}

/// `None` when nothing was eligible; otherwise whether every attempted
/// entry came back free of a verification failure.
pub fn verified_flag(summary: &VerificationSummary) -> Option<bool> {
    if summary.entries == 0 {
        None
    } else {
        Some(summary.failed == 0)
    }
}
