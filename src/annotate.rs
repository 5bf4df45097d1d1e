//! Cluster annotation edits. Every edit validates first and returns a complete
//! new dataset, so a rejected edit leaves the caller's dataset untouched.

use log::info;
use std::collections::BTreeSet;

use crate::{
    color::parse_css_color,
    data::{ClusterId, Dataset, MetaValue, CELL_TYPE_KEY},
    error::AnnotationError,
};

#[derive(Clone, Debug, PartialEq)]
pub enum ClusterEdit {
    Rename {
        cluster: ClusterId,
        name: String,
    },
    Merge {
        sources: Vec<ClusterId>,
        target: ClusterId,
        name: String,
    },
    Recolor {
        cluster: ClusterId,
        color: String,
    },
}

impl ClusterEdit {
    pub fn apply(&self, ds: &Dataset) -> Result<Dataset, AnnotationError> {
        match self {
            ClusterEdit::Rename { cluster, name } => rename(ds, *cluster, name),
            ClusterEdit::Merge { sources, target, name } => merge(ds, sources, *target, name),
            ClusterEdit::Recolor { cluster, color } => recolor(ds, *cluster, color),
        }
    }
}

/// Rename a cluster and mirror the name into each member cell's `cell_type`.
pub fn rename(ds: &Dataset, cluster: ClusterId, name: &str) -> Result<Dataset, AnnotationError> {
    if ds.cluster(cluster).is_none() {
        return Err(AnnotationError::UnknownCluster(cluster));
    }
    let mut out = ds.clone();
    if let Some(c) = out.cluster_mut(cluster) {
        c.name = name.to_string();
    }
    for cell in out.cells.iter_mut().filter(|c| c.cluster == cluster) {
        cell.metadata
            .insert(CELL_TYPE_KEY.to_string(), MetaValue::Text(name.to_string()));
    }
    info!("renamed cluster {cluster} to {name:?}");
    Ok(out)
}

/// Fold `sources` into `target`: member cells move to `target` and take
/// `name` as their `cell_type`, source entries are removed, and counts are
/// recomputed.
pub fn merge(ds: &Dataset, sources: &[ClusterId], target: ClusterId, name: &str) -> Result<Dataset, AnnotationError> {
    let sources: BTreeSet<ClusterId> = sources.iter().copied().collect();
    if sources.is_empty() {
        return Err(AnnotationError::EmptySources);
    }
    if sources.contains(&target) {
        return Err(AnnotationError::TargetInSources(target));
    }
    if ds.cluster(target).is_none() {
        return Err(AnnotationError::UnknownCluster(target));
    }
    if let Some(&missing) = sources.iter().find(|&&s| ds.cluster(s).is_none()) {
        return Err(AnnotationError::UnknownCluster(missing));
    }

    let mut out = ds.clone();
    let mut moved = 0usize;
    for cell in out.cells.iter_mut() {
        if sources.contains(&cell.cluster) {
            cell.cluster = target;
            cell.metadata
                .insert(CELL_TYPE_KEY.to_string(), MetaValue::Text(name.to_string()));
            moved += 1;
        }
    }
    out.clusters.retain(|c| !sources.contains(&c.id));
    if let Some(c) = out.cluster_mut(target) {
        c.name = name.to_string();
    }
    out.recount_clusters();
    info!(
        "merged clusters {:?} into {target} ({moved} cells) as {name:?}",
        sources
    );
    Ok(out)
}

pub fn recolor(ds: &Dataset, cluster: ClusterId, color: &str) -> Result<Dataset, AnnotationError> {
    if parse_css_color(color).is_none() {
        return Err(AnnotationError::InvalidColor(color.to_string()));
    }
    let mut out = ds.clone();
    let c = out
        .cluster_mut(cluster)
        .ok_or(AnnotationError::UnknownCluster(cluster))?;
    c.color = color.to_string();
    info!("recolored cluster {cluster} to {color}");
    Ok(out)
}

/// Keeps the dataset as loaded so any sequence of edits can be undone at once.
#[derive(Clone, Debug)]
pub struct AnnotationHistory {
    original: Dataset,
    edits: Vec<ClusterEdit>,
}

impl AnnotationHistory {
    pub fn new(original: Dataset) -> Self {
        Self {
            original,
            edits: Vec::new(),
        }
    }

    /// Apply `edit` to `current`, recording it on success.
    pub fn apply(&mut self, current: &Dataset, edit: ClusterEdit) -> Result<Dataset, AnnotationError> {
        let next = edit.apply(current)?;
        self.edits.push(edit);
        Ok(next)
    }

    pub fn edits(&self) -> &[ClusterEdit] {
        &self.edits
    }

    pub fn original(&self) -> &Dataset {
        &self.original
    }

    /// The dataset exactly as loaded; edit history is dropped.
    pub fn reset(&mut self) -> Dataset {
        self.edits.clear();
        info!("cluster annotations reset");
        self.original.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tests::small_dataset;

    fn cell_type(ds: &Dataset, id: &str) -> String {
        ds.cell(id).and_then(|c| c.meta(CELL_TYPE_KEY)).map(|v| v.to_string()).unwrap_or_default()
    }

    #[test]
    fn rename_mirrors_cell_type() {
        let ds = small_dataset();
        let out = rename(&ds, 1, "Plasma B").unwrap();
        assert_eq!(out.cluster(1).unwrap().name, "Plasma B");
        assert_eq!(cell_type(&out, "c2"), "Plasma B");
        assert_eq!(cell_type(&out, "c3"), "Plasma B");
        assert_eq!(cell_type(&out, "c0"), "type0");
        assert_eq!(rename(&ds, 9, "x"), Err(AnnotationError::UnknownCluster(9)));
    }

    #[test]
    fn merge_moves_cells_and_drops_sources() {
        let ds = small_dataset();
        let out = merge(&ds, &[1, 2], 0, "Lymphocytes").unwrap();
        assert_eq!(out.clusters.len(), 1);
        assert_eq!(out.metadata.cluster_count, 1);
        assert_eq!(out.cells.len(), ds.cells.len());
        assert!(out.cells.iter().all(|c| c.cluster == 0));
        let t = out.cluster(0).unwrap();
        assert_eq!((t.name.as_str(), t.cell_count), ("Lymphocytes", 5));
        assert_eq!(cell_type(&out, "c4"), "Lymphocytes");
        // target's own cells keep their annotation
        assert_eq!(cell_type(&out, "c0"), "type0");
    }

    #[test]
    fn merge_count_invariant() {
        let ds = small_dataset();
        for (sources, target) in [(vec![0], 1), (vec![2], 0), (vec![0, 2], 1), (vec![1, 1], 2)] {
            let out = merge(&ds, &sources, target, "m").unwrap();
            let distinct: BTreeSet<_> = sources.iter().collect();
            assert_eq!(out.clusters.len(), ds.clusters.len() - distinct.len());
            let total: usize = out.clusters.iter().map(|c| c.cell_count).sum();
            assert_eq!(total, ds.cells.len());
            for (before, after) in ds.cells.iter().zip(&out.cells) {
                if sources.contains(&before.cluster) {
                    assert_eq!(after.cluster, target);
                }
            }
        }
    }

    #[test]
    fn invalid_merges_are_rejected_without_mutation() {
        let ds = small_dataset();
        let before = ds.clone();
        assert_eq!(merge(&ds, &[0, 1], 1, "x"), Err(AnnotationError::TargetInSources(1)));
        assert_eq!(merge(&ds, &[], 1, "x"), Err(AnnotationError::EmptySources));
        assert_eq!(merge(&ds, &[7], 1, "x"), Err(AnnotationError::UnknownCluster(7)));
        assert_eq!(merge(&ds, &[0], 7, "x"), Err(AnnotationError::UnknownCluster(7)));
        assert_eq!(ds, before);
    }

    #[test]
    fn recolor_touches_only_the_color() {
        let ds = small_dataset();
        let out = recolor(&ds, 2, "rgb(1, 2, 3)").unwrap();
        assert_eq!(out.cluster(2).unwrap().color, "rgb(1, 2, 3)");
        assert_eq!(out.cells, ds.cells);
        assert_eq!(
            recolor(&ds, 2, "not a color"),
            Err(AnnotationError::InvalidColor("not a color".into()))
        );
    }

    #[test]
    fn reset_restores_loaded_snapshot() {
        let ds = small_dataset();
        let mut history = AnnotationHistory::new(ds.clone());
        let a = history
            .apply(&ds, ClusterEdit::Rename { cluster: 0, name: "T".into() })
            .unwrap();
        let b = history
            .apply(&a, ClusterEdit::Merge { sources: vec![2], target: 1, name: "BNK".into() })
            .unwrap();
        let c = history
            .apply(&b, ClusterEdit::Recolor { cluster: 1, color: "#000000".into() })
            .unwrap();
        assert_ne!(c, ds);
        assert!(history.apply(&c, ClusterEdit::Rename { cluster: 2, name: "gone".into() }).is_err());
        assert_eq!(history.edits().len(), 3);
        assert_eq!(history.reset(), ds);
        assert!(history.edits().is_empty());
    }
}
