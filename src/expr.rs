//! Per-cell expression lookup with a synthetic fallback for datasets that do
//! not embed expression values.

use log::debug;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{StandardNormal, Uniform};
use std::collections::HashMap;

use crate::data::{ClusterId, Dataset, ExpressionMap};

/// Differential-expression rows qualify as markers below this adjusted p-value.
const MARKER_MAX_P_ADJ: f64 = 0.05;

/// gene -> the cluster it marks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MarkerTable {
    by_gene: HashMap<String, ClusterId>,
}

impl MarkerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first registration of a gene wins.
    pub fn insert(&mut self, gene: impl Into<String>, cluster: ClusterId) {
        self.by_gene.entry(gene.into()).or_insert(cluster);
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, ClusterId)>,
        S: Into<String>,
    {
        let mut t = Self::new();
        for (g, c) in pairs {
            t.insert(g, c);
        }
        t
    }

    /// Up-regulated, significant DE rows register their gene as a marker of the
    /// cluster whose name or id matches the row's cluster label.
    pub fn from_dataset(ds: &Dataset) -> Self {
        let mut t = Self::new();
        for r in ds.differential_expression.iter() {
            if !(r.log_fc > 0.0 && r.p_adj < MARKER_MAX_P_ADJ) {
                continue;
            }
            let cluster = ds
                .clusters
                .iter()
                .find(|c| c.name == r.cluster || c.id.to_string() == r.cluster);
            if let Some(c) = cluster {
                t.insert(r.gene.clone(), c.id);
            }
        }
        t
    }

    pub fn cluster_for(&self, gene: &str) -> Option<ClusterId> {
        self.by_gene.get(gene).copied()
    }

    pub fn len(&self) -> usize {
        self.by_gene.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_gene.is_empty()
    }
}

/// Resolves gene names to per-cell values.
///
/// Embedded expression is returned as stored (sparse: absent cells are zero).
/// Otherwise values are drawn from a ChaCha stream seeded by `(seed, gene)`, so a
/// given gene always resolves to the same values for the same seed.
#[derive(Clone, Debug)]
pub struct ExpressionResolver {
    seed: u64,
    markers: MarkerTable,
}

impl ExpressionResolver {
    pub fn new(seed: u64, markers: MarkerTable) -> Self {
        Self { seed, markers }
    }

    /// Resolver whose marker table is derived from the dataset's DE rows.
    pub fn for_dataset(ds: &Dataset, seed: u64) -> Self {
        Self::new(seed, MarkerTable::from_dataset(ds))
    }

    pub fn resolve(&self, ds: &Dataset, gene: &str) -> ExpressionMap {
        if let Some(stored) = ds.gene_expression(gene) {
            return stored.clone();
        }
        self.synthesize(ds, gene)
    }

    pub fn resolve_many<S: AsRef<str>>(&self, ds: &Dataset, genes: &[S]) -> Vec<ExpressionMap> {
        genes.iter().map(|g| self.resolve(ds, g.as_ref())).collect()
    }

    pub fn resolve_averaged<S: AsRef<str>>(&self, ds: &Dataset, genes: &[S]) -> ExpressionMap {
        average_maps(&self.resolve_many(ds, genes))
    }

    fn synthesize(&self, ds: &Dataset, gene: &str) -> ExpressionMap {
        let mut rng = ChaCha8Rng::seed_from_u64(gene_seed(self.seed, gene));
        let marker_of = self.markers.cluster_for(gene);
        debug!(
            "synthesizing expression for {gene} ({})",
            match marker_of {
                Some(c) => format!("marker of cluster {c}"),
                None => "housekeeping".to_string(),
            }
        );
        let high = Uniform::new(1.75, 4.25);
        let low = Uniform::new(0.0, 0.8);
        let mut out = ExpressionMap::with_capacity(ds.cells.len());
        for cell in &ds.cells {
            let v = match marker_of {
                Some(c) if c == cell.cluster => rng.sample(&high),
                Some(_) => rng.sample(&low),
                None => {
                    let z: f64 = rng.sample(StandardNormal);
                    (1.0 + 0.5 * z).max(0.0)
                }
            };
            out.insert(cell.id.clone(), v);
        }
        out
    }
}

/// Per-cell mean over the maps that actually contain the cell. A cell missing
/// from one gene's map is left out of that gene's contribution, not counted as zero.
pub fn average_maps(maps: &[ExpressionMap]) -> ExpressionMap {
    let mut acc: HashMap<&str, (f64, u32)> = HashMap::new();
    for m in maps {
        for (cell, &v) in m {
            let e = acc.entry(cell.as_str()).or_insert((0.0, 0));
            e.0 += v;
            e.1 += 1;
        }
    }
    acc.into_iter()
        .map(|(cell, (sum, n))| {
            let mean = if n == 0 { 0.0 } else { sum / n as f64 };
            (cell.to_string(), mean)
        })
        .collect()
}

/// FNV-1a over the gene name, mixed with the resolver seed.
fn gene_seed(seed: u64, gene: &str) -> u64 {
    let mut hash = 1469598103934665603u64 ^ seed.wrapping_mul(1099511628211);
    for b in gene.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{tests::small_dataset, ExpressionMatrix};
    use std::sync::Arc;

    fn map(pairs: &[(&str, f64)]) -> ExpressionMap {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn embedded_expression_is_returned_verbatim() {
        let mut ds = small_dataset();
        let mut genes = HashMap::new();
        genes.insert("CD3E".to_string(), map(&[("c0", 4.0)]));
        genes.insert("EMPTY".to_string(), ExpressionMap::new());
        ds.expression = Some(Arc::new(ExpressionMatrix::new(genes)));
        let r = ExpressionResolver::new(1, MarkerTable::new());
        assert_eq!(r.resolve(&ds, "CD3E"), map(&[("c0", 4.0)]));
        assert!(r.resolve(&ds, "EMPTY").is_empty());
        // not embedded: synthesized for every cell
        assert_eq!(r.resolve(&ds, "GAPDH").len(), ds.cells.len());
    }

    #[test]
    fn synthesis_is_reproducible_per_seed() {
        let ds = small_dataset();
        let a = ExpressionResolver::new(7, MarkerTable::new());
        let b = ExpressionResolver::new(7, MarkerTable::new());
        let c = ExpressionResolver::new(8, MarkerTable::new());
        assert_eq!(a.resolve(&ds, "ACTB"), b.resolve(&ds, "ACTB"));
        assert_ne!(a.resolve(&ds, "ACTB"), c.resolve(&ds, "ACTB"));
        assert_ne!(a.resolve(&ds, "ACTB"), a.resolve(&ds, "GAPDH"));
    }

    #[test]
    fn marker_ranges() {
        let ds = small_dataset();
        let r = ExpressionResolver::new(3, MarkerTable::from_pairs([("CD3E", 0)]));
        let m = r.resolve(&ds, "CD3E");
        for cell in &ds.cells {
            let v = m[&cell.id];
            if cell.cluster == 0 {
                assert!((1.75..4.25).contains(&v), "{v}");
            } else {
                assert!((0.0..0.8).contains(&v), "{v}");
            }
        }
        let hk = r.resolve(&ds, "ACTB");
        assert!(hk.values().all(|&v| v >= 0.0));
    }

    #[test]
    fn markers_derived_from_de_rows() {
        let ds = small_dataset();
        let t = MarkerTable::from_dataset(&ds);
        assert_eq!(t.cluster_for("CD3E"), Some(0));
        assert_eq!(t.cluster_for("MS4A1"), None);
    }

    #[test]
    fn first_marker_registration_wins() {
        let t = MarkerTable::from_pairs([("X", 1), ("X", 2)]);
        assert_eq!(t.cluster_for("X"), Some(1));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn average_ignores_missing_entries() {
        let a = map(&[("c1", 2.0), ("c2", 1.0)]);
        let b = map(&[("c2", 3.0), ("c3", 5.0)]);
        let avg = average_maps(&[a, b]);
        assert_eq!(avg["c1"], 2.0);
        assert_eq!(avg["c2"], 2.0);
        assert_eq!(avg["c3"], 5.0);
        assert_eq!(avg.len(), 3);
        assert!(average_maps(&[]).is_empty());
    }
}
