use std::collections::BTreeSet;

use crate::data::{Cell, ClusterId};

/// Sample / cluster restriction. An empty set means "no restriction" on that axis.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct CellFilter {
    pub samples: BTreeSet<String>,
    pub clusters: BTreeSet<ClusterId>,
}

impl CellFilter {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty() && self.clusters.is_empty()
    }

    pub fn passes(&self, cell: &Cell) -> bool {
        let sample_ok = self.samples.is_empty()
            || cell
                .sample()
                .map(|s| self.samples.contains(s.as_ref()))
                .unwrap_or(false);
        sample_ok && (self.clusters.is_empty() || self.clusters.contains(&cell.cluster))
    }

    /// Indices of passing cells, in dataset order.
    pub fn apply(&self, cells: &[Cell]) -> Vec<usize> {
        cells
            .iter()
            .enumerate()
            .filter(|(_, c)| self.passes(c))
            .map(|(i, _)| i)
            .collect()
    }

    /// Drop cluster ids that no longer exist (after a merge).
    pub fn retain_clusters(&mut self, existing: &BTreeSet<ClusterId>) {
        self.clusters.retain(|c| existing.contains(c));
    }
}
