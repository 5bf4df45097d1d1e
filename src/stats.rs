use std::collections::BTreeMap;

use crate::data::{Cell, ClusterId, ExpressionMap};

#[derive(Clone, Debug, PartialEq)]
pub struct ClusterSummary {
    pub cluster: ClusterId,
    pub n_cells: usize,
    pub centroid: [f64; 2],
    /// Mean over the cluster's cells, absent cells counting as zero.
    pub mean_expression: Option<f64>,
    /// Fraction of cells with a non-zero value.
    pub frac_expressing: Option<f64>,
}

#[derive(Default)]
struct Acc {
    n: usize,
    sx: f64,
    sy: f64,
    sum: f64,
    nonzero: usize,
}

/// Per-cluster summaries over the `visible` cells, ordered by cluster id.
pub fn cluster_summaries(cells: &[Cell], visible: &[usize], expr: Option<&ExpressionMap>) -> Vec<ClusterSummary> {
    let mut acc: BTreeMap<ClusterId, Acc> = BTreeMap::new();
    for &i in visible {
        let c = &cells[i];
        let a = acc.entry(c.cluster).or_default();
        a.n += 1;
        a.sx += c.x;
        a.sy += c.y;
        if let Some(m) = expr {
            let v = m.get(&c.id).copied().unwrap_or(0.0);
            a.sum += v;
            if v > 0.0 {
                a.nonzero += 1;
            }
        }
    }
    acc.into_iter()
        .map(|(cluster, a)| {
            let n = a.n as f64;
            ClusterSummary {
                cluster,
                n_cells: a.n,
                centroid: [a.sx / n, a.sy / n],
                mean_expression: expr.map(|_| a.sum / n),
                frac_expressing: expr.map(|_| a.nonzero as f64 / n),
            }
        })
        .collect()
}

/// Mean position of each cluster's visible cells.
pub fn centroids(cells: &[Cell], visible: &[usize]) -> Vec<(ClusterId, [f64; 2])> {
    cluster_summaries(cells, visible, None)
        .into_iter()
        .map(|s| (s.cluster, s.centroid))
        .collect()
}
