//! Segment topology
//!
//! Parent/child links are derived once from outlet adjacency: a segment's
//! child is the segment that owns its junction pixel. Ancestor and
//! descendant sets are computed on demand by breadth-first traversal and
//! are not cached.

use std::collections::VecDeque;

use streamnet_core::Result;

use super::{Network, SegmentId};

#[derive(Debug, Clone, Default)]
pub(super) struct Topology {
    parents: Vec<Vec<SegmentId>>,
    child: Vec<Option<SegmentId>>,
}

impl Topology {
    /// Reserve the slot of a newly created segment
    pub(super) fn push(&mut self) {
        self.parents.push(Vec::new());
        self.child.push(None);
    }

    pub(super) fn build(network: &Network) -> Self {
        let slots = network.segments.len();
        let mut topology = Topology {
            parents: vec![Vec::new(); slots],
            child: vec![None; slots],
        };
        for segment in network.segments() {
            let Some((row, col)) = segment.junction() else {
                continue;
            };
            if let Some(child) = network.segment_at(row, col) {
                topology.child[segment.id().slot()] = Some(child);
                topology.parents[child.slot()].push(segment.id());
            }
        }
        topology
    }

    /// Unlink a segment from its parents and child, returning the parents
    /// that became terminal
    pub(super) fn detach(&mut self, id: SegmentId) -> Vec<SegmentId> {
        let slot = id.slot();
        let orphaned = std::mem::take(&mut self.parents[slot]);
        for parent in &orphaned {
            self.child[parent.slot()] = None;
        }
        if let Some(child) = self.child[slot].take() {
            self.parents[child.slot()].retain(|&p| p != id);
        }
        orphaned
    }

    fn parents(&self, id: SegmentId) -> &[SegmentId] {
        &self.parents[id.slot()]
    }

    fn child(&self, id: SegmentId) -> Option<SegmentId> {
        self.child[id.slot()]
    }

    fn terminal_of(&self, id: SegmentId) -> SegmentId {
        let mut current = id;
        while let Some(child) = self.child(current) {
            current = child;
        }
        current
    }

    pub(super) fn ancestors(&self, id: SegmentId) -> Vec<SegmentId> {
        let mut found = Vec::new();
        let mut queue: VecDeque<SegmentId> = self.parents(id).iter().copied().collect();
        while let Some(parent) = queue.pop_front() {
            found.push(parent);
            queue.extend(self.parents(parent).iter().copied());
        }
        found.sort_unstable();
        found
    }

    pub(super) fn descendants(&self, id: SegmentId) -> Vec<SegmentId> {
        let mut found = Vec::new();
        let mut current = id;
        while let Some(child) = self.child(current) {
            found.push(child);
            current = child;
        }
        found
    }
}

impl Network {
    /// Immediate upstream segments, in ascending ID order
    pub fn parents(&self, id: SegmentId) -> Result<&[SegmentId]> {
        self.segment(id)?;
        Ok(self.topology.parents(id))
    }

    /// Immediate downstream segment
    pub fn child(&self, id: SegmentId) -> Result<Option<SegmentId>> {
        self.segment(id)?;
        Ok(self.topology.child(id))
    }

    /// Whether the segment has no child
    pub fn is_terminal(&self, id: SegmentId) -> Result<bool> {
        Ok(self.child(id)?.is_none())
    }

    /// Every segment upstream of `id`, in ascending ID order
    pub fn ancestors(&self, id: SegmentId) -> Result<Vec<SegmentId>> {
        self.segment(id)?;
        Ok(self.topology.ancestors(id))
    }

    /// Every segment downstream of `id`, nearest first
    pub fn descendants(&self, id: SegmentId) -> Result<Vec<SegmentId>> {
        self.segment(id)?;
        Ok(self.topology.descendants(id))
    }

    /// Ancestors, descendants and the segment itself, in ascending ID order
    pub fn family(&self, id: SegmentId) -> Result<Vec<SegmentId>> {
        let mut family = self.ancestors(id)?;
        family.push(id);
        family.extend(self.topology.descendants(id));
        family.sort_unstable();
        Ok(family)
    }

    /// Every segment of `id`'s local drainage network, in ascending ID order
    pub fn local_network(&self, id: SegmentId) -> Result<Vec<SegmentId>> {
        let terminal = self.terminal_of(id)?;
        let mut members = self.topology.ancestors(terminal);
        members.push(terminal);
        members.sort_unstable();
        Ok(members)
    }

    /// Terminal segment of `id`'s local drainage network
    pub fn terminal_of(&self, id: SegmentId) -> Result<SegmentId> {
        self.segment(id)?;
        Ok(self.topology.terminal_of(id))
    }

    /// IDs of all terminal segments, one per local network, ascending
    pub fn terminal_ids(&self) -> Vec<SegmentId> {
        self.segments()
            .map(|segment| segment.id())
            .filter(|&id| self.topology.child(id).is_none())
            .collect()
    }

    /// Whether `inner`'s local network drains into `outer`'s terminal
    /// outlet basin.
    ///
    /// Tests whether the terminal outlet pixel of `inner`'s network lies in
    /// the catchment of `outer`'s terminal outlet, by following the flow path
    /// down from that pixel. A network never contains itself.
    pub fn basin_contains(&self, outer: SegmentId, inner: SegmentId) -> Result<bool> {
        let outer = self.terminal_of(outer)?;
        let inner = self.terminal_of(inner)?;
        if outer == inner {
            return Ok(false);
        }
        let target = self.outlet(outer)?;
        let start = self.outlet(inner)?;
        Ok(self.flow_path(start).any(|pixel| pixel == target))
    }

    /// Whether `id`'s local network lies within another network's terminal
    /// outlet basin
    pub fn is_nested(&self, id: SegmentId) -> Result<bool> {
        let terminal = self.terminal_of(id)?;
        let start = self.outlet(terminal)?;
        Ok(self.flow_path(start).any(|(row, col)| {
            self.segment_at(row, col)
                .is_some_and(|other| self.topology.terminal_of(other) != terminal)
        }))
    }

    /// Pixels downstream of `start` along the D8 flow path, excluding
    /// `start`. Bounded by the grid size so a cycle cannot loop forever.
    fn flow_path(&self, start: (usize, usize)) -> impl Iterator<Item = (usize, usize)> + '_ {
        let limit = self.flow.len();
        std::iter::successors(self.flow.downstream(start.0, start.1), |&(row, col)| {
            self.flow.downstream(row, col)
        })
        .take(limit)
    }
}
