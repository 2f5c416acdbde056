//! Selection-based filtering
//!
//! [`Network::continuous`] adjusts a selection so that removing segments
//! never opens a gap in a flow path: a segment may only be removed at an
//! edge of what remains, meaning nothing upstream of it or nothing
//! downstream of it is kept. [`Network::keep`] and [`Network::remove`]
//! apply a selection verbatim.

use serde::{Deserialize, Serialize};
use streamnet_core::{Error, Result};
use tracing::{info, warn};

use super::{Network, SegmentId};

/// Segments chosen by ID or by a boolean mask over live segments in ID order
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Ids(Vec<SegmentId>),
    Mask(Vec<bool>),
}

impl From<Vec<SegmentId>> for Selection {
    fn from(ids: Vec<SegmentId>) -> Self {
        Selection::Ids(ids)
    }
}

impl From<Vec<bool>> for Selection {
    fn from(mask: Vec<bool>) -> Self {
        Selection::Mask(mask)
    }
}

/// Parameters for [`Network::continuous`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContinuityParams {
    /// The selection lists segments to remove (`true`) or to keep (`false`)
    pub remove: bool,
    /// Never remove segments at the upstream edge of what remains
    pub keep_upstream: bool,
    /// Never remove segments at the downstream edge of what remains
    pub keep_downstream: bool,
}

/// Result of [`Network::continuous`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionOutcome {
    /// Segments to remove (or keep), in the sense of [`ContinuityParams::remove`]
    pub ids: Vec<SegmentId>,
    /// Requested IDs that are not in the network
    pub skipped: Vec<SegmentId>,
}

impl SelectionOutcome {
    /// The outcome as a selection, ready for [`Network::keep`] or [`Network::remove`]
    pub fn selection(&self) -> Selection {
        Selection::Ids(self.ids.clone())
    }
}

/// Result of [`Network::keep`] and [`Network::remove`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalReport {
    pub removed: Vec<SegmentId>,
    /// Requested IDs that are not in the network
    pub skipped: Vec<SegmentId>,
}

impl Network {
    /// Per-slot membership of a selection, plus the unknown IDs it named
    fn resolve(&self, selection: &Selection) -> Result<(Vec<bool>, Vec<SegmentId>)> {
        let mut selected = vec![false; self.segments.len()];
        let mut skipped = Vec::new();
        match selection {
            Selection::Ids(ids) => {
                for &id in ids {
                    if self.contains(id) {
                        selected[id.slot()] = true;
                    } else {
                        skipped.push(id);
                    }
                }
            }
            Selection::Mask(mask) => {
                let live = self.ids();
                if mask.len() != live.len() {
                    return Err(Error::SelectionLength {
                        expected: live.len(),
                        actual: mask.len(),
                    });
                }
                for (id, &flag) in live.iter().zip(mask) {
                    selected[id.slot()] = flag;
                }
            }
        }
        if !skipped.is_empty() {
            warn!(?skipped, "selection names segments that are not in the network");
        }
        Ok((selected, skipped))
    }

    /// Adjust a selection so that applying it preserves flow continuity.
    ///
    /// With `params.remove`, `selection` holds removal candidates and the
    /// result is the subset that can be removed. Otherwise `selection` holds
    /// segments to keep and the result is the (possibly larger) set that
    /// must be kept. Candidates sitting between kept segments are retained,
    /// repeatedly, until nothing changes, so the result is idempotent.
    pub fn continuous(&self, selection: &Selection, params: ContinuityParams) -> Result<SelectionOutcome> {
        let (selected, skipped) = self.resolve(selection)?;
        let live = self.ids();

        let mut removing = vec![false; self.segments.len()];
        for &id in &live {
            removing[id.slot()] = selected[id.slot()] == params.remove;
        }

        loop {
            let mut changed = false;
            for &id in &live {
                if !removing[id.slot()] {
                    continue;
                }
                let upstream_edge = self
                    .topology
                    .ancestors(id)
                    .iter()
                    .all(|a| removing[a.slot()]);
                let downstream_edge = self
                    .topology
                    .descendants(id)
                    .iter()
                    .all(|d| removing[d.slot()]);
                let removable = (upstream_edge && !params.keep_upstream)
                    || (downstream_edge && !params.keep_downstream);
                if !removable {
                    removing[id.slot()] = false;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        let ids = live
            .into_iter()
            .filter(|id| removing[id.slot()] == params.remove)
            .collect();
        Ok(SelectionOutcome { ids, skipped })
    }

    /// Remove the selected segments.
    ///
    /// Parents of a removed segment become terminal; children lose it as a
    /// parent. Unknown IDs are skipped and reported. Any located basins are
    /// discarded.
    pub fn remove(&mut self, selection: &Selection) -> Result<RemovalReport> {
        let (selected, skipped) = self.resolve(selection)?;
        let removed = self.remove_slots(&selected);
        Ok(RemovalReport { removed, skipped })
    }

    /// Keep only the selected segments, removing every other one.
    pub fn keep(&mut self, selection: &Selection) -> Result<RemovalReport> {
        let (selected, skipped) = self.resolve(selection)?;
        let mut complement = vec![false; selected.len()];
        for id in self.ids() {
            complement[id.slot()] = !selected[id.slot()];
        }
        let removed = self.remove_slots(&complement);
        Ok(RemovalReport { removed, skipped })
    }

    fn remove_slots(&mut self, remove: &[bool]) -> Vec<SegmentId> {
        let removed: Vec<SegmentId> = self.ids().into_iter().filter(|id| remove[id.slot()]).collect();
        for &id in &removed {
            for parent in self.topology.detach(id) {
                self.clear_junction(parent);
            }
            if let Some(segment) = self.segments[id.slot()].take() {
                for &(row, col) in segment.pixels() {
                    let idx = self.flow.index(row, col);
                    self.owner[idx] = 0;
                }
            }
        }
        if !removed.is_empty() {
            self.basins.invalidate();
        }
        info!(removed = removed.len(), remaining = self.len(), "filtered stream segments");
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_grids::*;
    use super::*;

    // two_networks(): 1→5, 2→5, 5→6, 4→6; 3 is isolated

    fn ids(values: &[u32]) -> Vec<SegmentId> {
        values.iter().map(|&v| SegmentId(v)).collect()
    }

    fn removal() -> ContinuityParams {
        ContinuityParams {
            remove: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_middle_segment_is_retained() {
        let net = two_networks();
        let out = net.continuous(&Selection::Ids(ids(&[5])), removal()).unwrap();
        assert!(out.ids.is_empty());
    }

    #[test]
    fn test_head_branch_can_be_removed() {
        let net = two_networks();
        let out = net.continuous(&Selection::Ids(ids(&[1, 5])), removal()).unwrap();
        // 5 still sits between 2 and 6
        assert_eq!(out.ids, ids(&[1]));

        let out = net.continuous(&Selection::Ids(ids(&[1, 2, 5])), removal()).unwrap();
        assert_eq!(out.ids, ids(&[1, 2, 5]));
    }

    #[test]
    fn test_downstream_edge_can_be_removed() {
        let net = two_networks();
        let out = net.continuous(&Selection::Ids(ids(&[6])), removal()).unwrap();
        assert_eq!(out.ids, ids(&[6]));

        let params = ContinuityParams {
            keep_downstream: true,
            ..removal()
        };
        let out = net.continuous(&Selection::Ids(ids(&[6])), params).unwrap();
        assert!(out.ids.is_empty());
    }

    #[test]
    fn test_keep_upstream() {
        let net = two_networks();
        let params = ContinuityParams {
            keep_upstream: true,
            ..removal()
        };
        let out = net.continuous(&Selection::Ids(ids(&[1, 2, 5])), params).unwrap();
        assert!(out.ids.is_empty());

        let out = net.continuous(&Selection::Ids(ids(&[1, 2, 5])), removal()).unwrap();
        assert_eq!(out.ids, ids(&[1, 2, 5]));
    }

    #[test]
    fn test_keep_mode_grows_selection() {
        let net = two_networks();
        // Keeping 1 and 6 forces 5 to stay
        let out = net
            .continuous(&Selection::Ids(ids(&[1, 6])), ContinuityParams::default())
            .unwrap();
        assert_eq!(out.ids, ids(&[1, 5, 6]));
    }

    #[test]
    fn test_continuous_is_idempotent() {
        let net = two_networks();
        for params in [removal(), ContinuityParams::default()] {
            for picks in [vec![5], vec![1, 5], vec![5, 6], vec![2, 3, 6], vec![1, 2, 4, 5]] {
                let once = net.continuous(&Selection::Ids(ids(&picks)), params).unwrap();
                let twice = net.continuous(&once.selection(), params).unwrap();
                assert_eq!(once.ids, twice.ids, "{:?} {:?}", params, picks);
            }
        }
    }

    #[test]
    fn test_unknown_ids_are_skipped() {
        let mut net = two_networks();
        let out = net.continuous(&Selection::Ids(ids(&[3, 42])), removal()).unwrap();
        assert_eq!(out.ids, ids(&[3]));
        assert_eq!(out.skipped, ids(&[42]));

        let report = net.remove(&Selection::Ids(ids(&[99, 3]))).unwrap();
        assert_eq!(report.removed, ids(&[3]));
        assert_eq!(report.skipped, ids(&[99]));
        assert_eq!(net.len(), 5);
    }

    #[test]
    fn test_mask_length_is_checked() {
        let net = two_networks();
        let result = net.continuous(&Selection::Mask(vec![true; 2]), removal());
        assert!(matches!(
            result,
            Err(Error::SelectionLength { expected: 6, actual: 2 })
        ));
    }

    #[test]
    fn test_remove_updates_topology() {
        let mut net = two_networks();
        net.remove(&Selection::Ids(ids(&[6]))).unwrap();

        assert!(!net.contains(SegmentId(6)));
        assert_eq!(net.child(SegmentId(5)).unwrap(), None);
        assert_eq!(net.terminal_ids(), ids(&[3, 4, 5]));
        assert_eq!(net.segment_at(6, 2), None);
        // IDs are never reused
        assert!(net.segment(SegmentId(6)).is_err());
        assert_eq!(net.ids(), ids(&[1, 2, 3, 4, 5]));
    }

    #[test]
    fn test_orphaned_parent_ends_at_its_outlet() {
        let mut net = two_networks();
        let before = net.segment(SegmentId(5)).unwrap().length();
        net.remove(&Selection::Ids(ids(&[6]))).unwrap();

        let parent = net.segment(SegmentId(5)).unwrap();
        assert_eq!(parent.junction(), None);
        assert_eq!(parent.coordinates().last(), Some(parent.outlet()));
        assert_eq!(parent.coordinates().count(), 3);
        approx::assert_relative_eq!(parent.length(), before - 10.0);
        assert_eq!(net.segment(SegmentId(4)).unwrap().coordinates().last(), Some((5, 1)));
    }

    #[test]
    fn test_remove_head_detaches_from_child() {
        let mut net = two_networks();
        net.remove(&Selection::Ids(ids(&[1]))).unwrap();
        assert_eq!(net.parents(SegmentId(5)).unwrap(), ids(&[2]).as_slice());
    }

    #[test]
    fn test_keep_by_mask() {
        let mut net = two_networks();
        let mask = vec![false, false, true, false, false, false];
        let report = net.keep(&Selection::Mask(mask)).unwrap();
        assert_eq!(report.removed, ids(&[1, 2, 4, 5, 6]));
        assert_eq!(net.ids(), ids(&[3]));
    }
}
