//! # Per-File Sync Decision Engine
//!
//! Given what the staged source, the local workspace, and the tracker each
//! say about one file, choose what the ingest pass does with it. This is a
//! pure function: no I/O, no clock, no errors. The executor performs the
//! chosen action and records the result; running the engine again with the
//! recorded state must then yield [`Decision::Skip`].
//!
//! The rules are ordered; the first match wins:
//!
//! 1. local file missing                         → Copy (bootstrap)
//! 2. force flag                                 → Copy
//! 3. last action merge, upstream unmoved        → Skip
//! 4. last action merge, upstream advanced       → Merge (re-merge)
//! 5. never synced                               → Copy
//! 6. only upstream changed                      → Copy
//! 7. only local changed                         → Skip (preserve edits)
//! 8. local already equals upstream              → UpdateTracker
//! 9. both sides diverged                        → Merge
//! 10. otherwise                                 → Skip
//!
//! Rule 3 is what makes an AI-assisted merge stable: once a file has been
//! merged, its local bytes intentionally differ from upstream, and that
//! difference must not trigger another merge until upstream actually moves.

use crate::tracker::SyncAction;

/// Outcome for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Write the source bytes over the local file and record the new hash.
    Copy,
    /// Touch nothing: no file I/O, no tracker update.
    Skip,
    /// Reconcile local and source through the merge oracle.
    Merge,
    /// No file I/O, but refresh the recorded hash to the current local hash.
    UpdateTracker,
}

/// Everything the engine is allowed to look at for one file.
#[derive(Debug, Clone)]
pub struct DecisionInput<'a> {
    /// Digest of the staged source file. The caller only enumerates files
    /// that exist in the snapshot, so this is never the absent sentinel.
    pub source_hash: &'a str,
    /// Digest of the local file; empty means the local file is absent.
    pub local_hash: &'a str,
    /// Hash recorded at the last sync; `None` means never synced.
    pub tracked_hash: Option<&'a str>,
    /// Action recorded at the last sync.
    pub tracked_action: Option<SyncAction>,
    /// Repo commit recorded at the last ingest; `None` on first sync.
    pub last_commit: Option<&'a str>,
    /// Tip commit observed this run.
    pub current_commit: &'a str,
    /// Operator override: overwrite regardless of local state.
    pub force: bool,
}

/// Decide what to do with one file. Pure and total.
pub fn decide(input: &DecisionInput) -> Decision {
    let source = input.source_hash;
    let local = input.local_hash;

    if local.is_empty() {
        return Decision::Copy;
    }

    if input.force {
        return Decision::Copy;
    }

    if input.tracked_action == Some(SyncAction::Merge) {
        let upstream_unmoved = input.last_commit == Some(input.current_commit);
        return if upstream_unmoved {
            Decision::Skip
        } else {
            Decision::Merge
        };
    }

    let tracked = match input.tracked_hash {
        None => return Decision::Copy,
        Some(t) => t,
    };

    if local == tracked && local != source {
        return Decision::Copy;
    }

    if local != tracked && tracked == source {
        return Decision::Skip;
    }

    if local != tracked && local == source {
        return Decision::UpdateTracker;
    }

    if local != tracked && local != source && source != tracked {
        return Decision::Merge;
    }

    Decision::Skip
}

#[cfg(test)]
mod tests {
    use super::*;

    const H1: &str = "1111";
    const H2: &str = "2222";
    const H3: &str = "3333";
    const C1: &str = "abc123";
    const C2: &str = "def456";

    fn input<'a>() -> DecisionInput<'a> {
        DecisionInput {
            source_hash: H1,
            local_hash: H1,
            tracked_hash: Some(H1),
            tracked_action: Some(SyncAction::Copy),
            last_commit: Some(C1),
            current_commit: C1,
            force: false,
        }
    }

    #[test]
    fn test_local_missing_bootstraps_copy() {
        let mut i = input();
        i.local_hash = "";
        // Bootstrap wins over everything, including a recorded merge.
        i.tracked_action = Some(SyncAction::Merge);
        assert_eq!(decide(&i), Decision::Copy);
    }

    #[test]
    fn test_force_overrides_local_edits() {
        let mut i = input();
        i.local_hash = H2;
        i.force = true;
        assert_eq!(decide(&i), Decision::Copy);
    }

    #[test]
    fn test_merged_file_skipped_while_upstream_unmoved() {
        let mut i = input();
        i.tracked_action = Some(SyncAction::Merge);
        i.local_hash = H2;
        i.source_hash = H3;
        i.tracked_hash = Some(H2);
        assert_eq!(decide(&i), Decision::Skip);
    }

    #[test]
    fn test_merged_file_remerged_when_upstream_advances() {
        let mut i = input();
        i.tracked_action = Some(SyncAction::Merge);
        i.current_commit = C2;
        assert_eq!(decide(&i), Decision::Merge);
    }

    #[test]
    fn test_merged_file_with_no_recorded_commit_remerges() {
        let mut i = input();
        i.tracked_action = Some(SyncAction::Merge);
        i.last_commit = None;
        assert_eq!(decide(&i), Decision::Merge);
    }

    #[test]
    fn test_never_synced_copies() {
        let mut i = input();
        i.tracked_hash = None;
        i.tracked_action = None;
        i.local_hash = H2;
        assert_eq!(decide(&i), Decision::Copy);
    }

    #[test]
    fn test_upstream_only_change_overwrites() {
        let mut i = input();
        i.source_hash = H2;
        assert_eq!(decide(&i), Decision::Copy);
    }

    #[test]
    fn test_local_only_change_preserved() {
        let mut i = input();
        i.local_hash = H2;
        assert_eq!(decide(&i), Decision::Skip);
    }

    #[test]
    fn test_out_of_band_sync_refreshes_tracker() {
        // Local and source both moved to the same content; only the
        // bookkeeping is stale.
        let mut i = input();
        i.local_hash = H2;
        i.source_hash = H2;
        assert_eq!(decide(&i), Decision::UpdateTracker);
    }

    #[test]
    fn test_divergence_commits_to_merge() {
        let mut i = input();
        i.local_hash = H2;
        i.source_hash = H3;
        assert_eq!(decide(&i), Decision::Merge);
    }

    #[test]
    fn test_all_equal_is_noop() {
        assert_eq!(decide(&input()), Decision::Skip);
    }

    #[test]
    fn test_determinism() {
        let mut i = input();
        i.local_hash = H2;
        i.source_hash = H3;
        let first = decide(&i);
        for _ in 0..10 {
            assert_eq!(decide(&i), first);
        }
    }

    /// Applying the chosen action and re-deciding must yield Skip.
    #[test]
    fn test_idempotence_after_apply() {
        let scenarios: Vec<DecisionInput> = vec![
            // upstream-only change
            DecisionInput {
                source_hash: H2,
                local_hash: H1,
                tracked_hash: Some(H1),
                tracked_action: Some(SyncAction::Copy),
                last_commit: Some(C1),
                current_commit: C2,
                force: false,
            },
            // bootstrap
            DecisionInput {
                source_hash: H1,
                local_hash: "",
                tracked_hash: None,
                tracked_action: None,
                last_commit: None,
                current_commit: C1,
                force: false,
            },
            // stale tracker
            DecisionInput {
                source_hash: H2,
                local_hash: H2,
                tracked_hash: Some(H1),
                tracked_action: Some(SyncAction::Copy),
                last_commit: Some(C1),
                current_commit: C1,
                force: false,
            },
        ];

        for s in scenarios {
            let (local, tracked, action) = match decide(&s) {
                Decision::Copy => (
                    s.source_hash.to_string(),
                    s.source_hash.to_string(),
                    SyncAction::Copy,
                ),
                Decision::UpdateTracker => (
                    s.local_hash.to_string(),
                    s.local_hash.to_string(),
                    SyncAction::UpdateTracker,
                ),
                Decision::Merge => {
                    // A merged file settles on new bytes recorded verbatim.
                    ("merged".to_string(), "merged".to_string(), SyncAction::Merge)
                }
                Decision::Skip => (
                    s.local_hash.to_string(),
                    s.tracked_hash.unwrap_or_default().to_string(),
                    s.tracked_action.unwrap_or(SyncAction::Copy),
                ),
            };

            let next = DecisionInput {
                source_hash: s.source_hash,
                local_hash: &local,
                tracked_hash: Some(&tracked),
                tracked_action: Some(action),
                last_commit: Some(s.current_commit),
                current_commit: s.current_commit,
                force: false,
            };
            assert_eq!(decide(&next), Decision::Skip, "not idempotent: {:?}", s);
        }
    }
}
