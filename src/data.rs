use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt,
    sync::Arc,
};

pub type ClusterId = u32;

/// Per-gene expression values keyed by cell id. Absent cells are zero.
pub type ExpressionMap = HashMap<String, f64>;

/// Metadata key holding the sample a cell was sequenced in.
pub const SAMPLE_KEY: &str = "sample";
/// Metadata key mirrored from the cluster name by annotation edits.
pub const CELL_TYPE_KEY: &str = "cell_type";

/// A categorical or continuous metadata value attached to a cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Number(f64),
    Text(String),
}

impl MetaValue {
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            MetaValue::Text(s) => Cow::Borrowed(s.as_str()),
            MetaValue::Number(v) => Cow::Owned(format_number(*v)),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, MetaValue::Text(_))
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

/// Integral numbers print without a trailing ".0" so that `3` and `"3"` group together.
fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub cluster: ClusterId,
    pub metadata: BTreeMap<String, MetaValue>,
}

impl Cell {
    pub fn meta(&self, key: &str) -> Option<&MetaValue> {
        self.metadata.get(key)
    }

    pub fn sample(&self) -> Option<Cow<'_, str>> {
        self.meta(SAMPLE_KEY).map(|v| v.as_text())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterInfo {
    pub id: ClusterId,
    pub name: String,
    /// Cached; always equal to the number of cells assigned to `id`.
    pub cell_count: usize,
    /// CSS color string (`rgb(..)`, `hsl(..)` or `#rrggbb`).
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DatasetMetadata {
    pub name: String,
    pub description: String,
    pub cell_count: usize,
    pub gene_count: usize,
    pub cluster_count: usize,
    pub organism: Option<String>,
    pub tissue: Option<String>,
    pub source: Option<String>,
}

/// One differential-expression result row.
#[derive(Debug, Clone, PartialEq)]
pub struct DeRecord {
    pub gene: String,
    /// Cluster label as exported: a cluster name or a numeric id rendered as text.
    pub cluster: String,
    pub log_fc: f64,
    pub p_value: f64,
    pub p_adj: f64,
}

/// Sparse gene -> cell -> value storage. Only non-zero values need to be present.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExpressionMatrix {
    genes: HashMap<String, ExpressionMap>,
}

impl ExpressionMatrix {
    pub fn new(genes: HashMap<String, ExpressionMap>) -> Self {
        Self { genes }
    }

    pub fn gene(&self, gene: &str) -> Option<&ExpressionMap> {
        self.genes.get(gene)
    }

    pub fn gene_names(&self) -> impl Iterator<Item = &str> {
        self.genes.keys().map(|g| g.as_str())
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }
}

/// In-memory dataset. Replace cells through [`Dataset::set_cells`] so the id
/// index follows; edits otherwise touch only cluster assignment and metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub metadata: DatasetMetadata,
    pub cells: Vec<Cell>,
    pub genes: Vec<String>,
    pub clusters: Vec<ClusterInfo>,
    pub differential_expression: Arc<Vec<DeRecord>>,
    pub expression: Option<Arc<ExpressionMatrix>>,
    pub annotation_options: Vec<String>,
    cell_index: Arc<HashMap<String, usize>>,
}

impl Dataset {
    pub fn new(
        metadata: DatasetMetadata,
        cells: Vec<Cell>,
        genes: Vec<String>,
        clusters: Vec<ClusterInfo>,
        differential_expression: Vec<DeRecord>,
        expression: Option<ExpressionMatrix>,
        annotation_options: Vec<String>,
    ) -> Self {
        let mut ds = Self {
            metadata,
            cells,
            genes,
            clusters,
            differential_expression: Arc::new(differential_expression),
            expression: expression.map(Arc::new),
            annotation_options,
            cell_index: Arc::default(),
        };
        ds.reindex();
        ds.recount_clusters();
        ds
    }

    pub fn cluster(&self, id: ClusterId) -> Option<&ClusterInfo> {
        self.clusters.iter().find(|c| c.id == id)
    }

    pub fn cluster_mut(&mut self, id: ClusterId) -> Option<&mut ClusterInfo> {
        self.clusters.iter_mut().find(|c| c.id == id)
    }

    /// Position of the first cell with `id`. An index entry that no longer
    /// matches `cells` falls back to a scan.
    pub fn cell_index(&self, id: &str) -> Option<usize> {
        match self.cell_index.get(id) {
            Some(&i) if self.cells.get(i).is_some_and(|c| c.id == id) => Some(i),
            _ => self.cells.iter().position(|c| c.id == id),
        }
    }

    pub fn cell(&self, id: &str) -> Option<&Cell> {
        self.cell_index(id).and_then(|i| self.cells.get(i))
    }

    /// Replace every cell, rebuilding the id index and cluster counts.
    pub fn set_cells(&mut self, cells: Vec<Cell>) {
        self.cells = cells;
        self.reindex();
        self.recount_clusters();
    }

    fn reindex(&mut self) {
        let mut index = HashMap::with_capacity(self.cells.len());
        for (i, c) in self.cells.iter().enumerate() {
            index.entry(c.id.clone()).or_insert(i);
        }
        self.cell_index = Arc::new(index);
    }

    /// Embedded expression for `gene`, if the dataset carries any.
    pub fn gene_expression(&self, gene: &str) -> Option<&ExpressionMap> {
        self.expression.as_ref()?.gene(gene)
    }

    /// Recompute every cluster's cached cell count and the dataset-level totals.
    pub fn recount_clusters(&mut self) {
        let mut counts: HashMap<ClusterId, usize> = HashMap::new();
        for c in &self.cells {
            *counts.entry(c.cluster).or_default() += 1;
        }
        for cl in &mut self.clusters {
            cl.cell_count = counts.get(&cl.id).copied().unwrap_or(0);
        }
        self.metadata.cell_count = self.cells.len();
        self.metadata.cluster_count = self.clusters.len();
    }

    /// Distinct values of a metadata key over all cells, sorted.
    pub fn metadata_values(&self, key: &str) -> BTreeSet<String> {
        self.cells
            .iter()
            .filter_map(|c| c.meta(key))
            .map(|v| v.as_text().into_owned())
            .collect()
    }

    pub fn samples(&self) -> BTreeSet<String> {
        self.metadata_values(SAMPLE_KEY)
    }

    /// Differential-expression rows whose label refers to `cluster` (by name or id).
    pub fn de_for_cluster<'a>(&'a self, cluster: &'a ClusterInfo) -> impl Iterator<Item = &'a DeRecord> {
        let id = cluster.id.to_string();
        self.differential_expression
            .iter()
            .filter(move |r| r.cluster == cluster.name || r.cluster == id)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn cell(id: &str, x: f64, y: f64, cluster: ClusterId, sample: &str) -> Cell {
        let mut metadata = BTreeMap::new();
        metadata.insert(SAMPLE_KEY.to_string(), MetaValue::Text(sample.to_string()));
        metadata.insert(CELL_TYPE_KEY.to_string(), MetaValue::Text(format!("type{cluster}")));
        Cell {
            id: id.to_string(),
            x,
            y,
            cluster,
            metadata,
        }
    }

    pub(crate) fn cluster(id: ClusterId, name: &str) -> ClusterInfo {
        ClusterInfo {
            id,
            name: name.to_string(),
            cell_count: 0,
            color: format!("hsl({}, 70%, 50%)", id * 40),
        }
    }

    pub(crate) fn small_dataset() -> Dataset {
        let cells = vec![
            cell("c0", 0.0, 0.0, 0, "s1"),
            cell("c1", 1.0, 1.0, 0, "s1"),
            cell("c2", 5.0, 5.0, 1, "s2"),
            cell("c3", 6.0, 5.5, 1, "s2"),
            cell("c4", -3.0, 2.0, 2, "s1"),
        ];
        let clusters = vec![cluster(0, "T cells"), cluster(1, "B cells"), cluster(2, "NK")];
        Dataset::new(
            DatasetMetadata {
                name: "small".into(),
                ..Default::default()
            },
            cells,
            vec!["CD3E".into(), "MS4A1".into()],
            clusters,
            vec![DeRecord {
                gene: "CD3E".into(),
                cluster: "T cells".into(),
                log_fc: 2.5,
                p_value: 1e-8,
                p_adj: 1e-6,
            }],
            None,
            vec![SAMPLE_KEY.into(), CELL_TYPE_KEY.into()],
        )
    }

    #[test]
    fn new_recounts_clusters() {
        let ds = small_dataset();
        let counts: Vec<usize> = ds.clusters.iter().map(|c| c.cell_count).collect();
        assert_eq!(counts, vec![2, 2, 1]);
        assert_eq!(ds.metadata.cell_count, 5);
        assert_eq!(ds.metadata.cluster_count, 3);
    }

    #[test]
    fn cell_lookup_by_id() {
        let ds = small_dataset();
        assert_eq!(ds.cell_index("c3"), Some(3));
        assert_eq!(ds.cell("c2").map(|c| c.cluster), Some(1));
        assert!(ds.cell("missing").is_none());
    }

    #[test]
    fn replaced_cells_are_found_by_id() {
        let mut ds = small_dataset();
        ds.set_cells(vec![cell("x", 1.0, 1.0, 0, "s"), cell("y", 2.0, 3.0, 2, "s")]);
        assert_eq!(ds.cell_index("y"), Some(1));
        assert!(ds.cell("c3").is_none());
        assert_eq!(ds.metadata.cell_count, 2);
        assert_eq!(ds.cluster(2).map(|c| c.cell_count), Some(1));

        // direct field replacement leaves the index behind; lookups still hold
        ds.cells = vec![cell("c3", 0.0, 0.0, 1, "s")];
        assert_eq!(ds.cell_index("c3"), Some(0));
        assert!(ds.cell("y").is_none());
    }

    #[test]
    fn numeric_metadata_groups_with_text() {
        assert_eq!(MetaValue::Number(3.0).as_text(), "3");
        assert_eq!(MetaValue::Number(0.25).as_text(), "0.25");
        assert_eq!(MetaValue::Text("3".into()).to_string(), "3");
    }

    #[test]
    fn de_rows_match_by_name_or_id() {
        let mut ds = small_dataset();
        let mut rows = ds.differential_expression.as_ref().clone();
        rows.push(DeRecord {
            gene: "MS4A1".into(),
            cluster: "1".into(),
            log_fc: 3.0,
            p_value: 1e-9,
            p_adj: 1e-7,
        });
        ds.differential_expression = Arc::new(rows);
        let t = ds.cluster(0).cloned().unwrap();
        let b = ds.cluster(1).cloned().unwrap();
        assert_eq!(ds.de_for_cluster(&t).count(), 1);
        assert_eq!(ds.de_for_cluster(&b).map(|r| r.gene.as_str()).collect::<Vec<_>>(), vec!["MS4A1"]);
        assert_eq!(ds.samples().into_iter().collect::<Vec<_>>(), vec!["s1", "s2"]);
    }
}
