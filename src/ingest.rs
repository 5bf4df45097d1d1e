//! Dataset JSON ingestion: structural validation, warnings for missing optional
//! parts, and normalization of every field to its canonical type.
//!
//! Expected shape: `{ metadata, cells: [{id, x, y, cluster, metadata}], genes,
//! clusters: [{id, name, cellCount, color}], differentialExpression:
//! [{gene, cluster, logFC, pValue, pAdj}], expression?, annotationOptions? }`.

use log::{debug, info, warn};
use serde_json::{Map, Value};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    path::Path,
};

use crate::{
    color::{default_cluster_color, parse_css_color},
    data::{
        Cell, ClusterId, ClusterInfo, Dataset, DatasetMetadata, DeRecord, ExpressionMap, ExpressionMatrix,
        MetaValue,
    },
    error::{LoadError, ValidationError, ValidationWarning},
};

/// A dataset accepted for loading, with the non-blocking issues found on the way.
#[derive(Debug, Clone)]
pub struct LoadedDataset {
    pub dataset: Dataset,
    pub warnings: Vec<ValidationWarning>,
}

pub fn load_dataset_file(path: &Path) -> Result<LoadedDataset, LoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let loaded = parse_dataset_json(&text)?;
    info!(
        "loaded {} ({} cells, {} clusters, {} genes, {} warnings)",
        path.display(),
        loaded.dataset.cells.len(),
        loaded.dataset.clusters.len(),
        loaded.dataset.genes.len(),
        loaded.warnings.len()
    );
    Ok(loaded)
}

pub fn parse_dataset_json(text: &str) -> Result<LoadedDataset, LoadError> {
    let root: Value = serde_json::from_str(text)?;
    dataset_from_value(&root)
}

pub fn dataset_from_value(root: &Value) -> Result<LoadedDataset, LoadError> {
    let Some(root) = root.as_object() else {
        return Err(LoadError::Invalid(vec![ValidationError::NotAnObject]));
    };
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let cells_raw = match root.get("cells").and_then(Value::as_array) {
        None => {
            errors.push(ValidationError::MissingCells);
            None
        }
        Some(a) if a.is_empty() => {
            errors.push(ValidationError::EmptyCells);
            None
        }
        Some(a) => Some(a),
    };
    let clusters_raw = root.get("clusters").and_then(Value::as_array);
    if clusters_raw.is_none() {
        errors.push(ValidationError::MissingClusters);
    }

    let mut cells: Vec<Cell> = Vec::new();
    if let Some(arr) = cells_raw {
        cells.reserve(arr.len());
        for (i, v) in arr.iter().enumerate() {
            // only the first cell is held to strict JSON numbers; the rest are coerced
            match normalize_cell(i, v, i == 0) {
                Ok(c) => cells.push(c),
                Err(mut errs) if i == 0 => errors.append(&mut errs),
                Err(errs) => {
                    if let Some(cause) = errs.into_iter().next() {
                        warnings.push(ValidationWarning::DroppedCell { cause });
                    }
                }
            }
        }
    }

    let declared: Vec<(ClusterInfo, Option<usize>)> = clusters_raw
        .map(|arr| {
            arr.iter()
                .enumerate()
                .filter_map(|(i, v)| normalize_cluster(i, v, &mut errors))
                .collect()
        })
        .unwrap_or_default();

    if !errors.is_empty() {
        return Err(LoadError::Invalid(errors));
    }

    let mut seen = HashSet::with_capacity(cells.len());
    for c in &cells {
        if !seen.insert(c.id.as_str()) {
            warnings.push(ValidationWarning::DuplicateCellId { id: c.id.clone() });
        }
    }

    let clusters = reconcile_clusters(&cells, declared, &mut warnings);
    let expression = root.get("expression").and_then(Value::as_object).map(normalize_expression);
    let de = root
        .get("differentialExpression")
        .and_then(Value::as_array)
        .map(|rows| rows.iter().filter_map(normalize_de).collect::<Vec<_>>())
        .unwrap_or_default();

    let genes = match root.get("genes").and_then(Value::as_array) {
        Some(arr) => arr.iter().filter_map(as_string).collect(),
        None => {
            warnings.push(ValidationWarning::MissingGenes);
            let mut g: BTreeSet<String> = de.iter().map(|r| r.gene.clone()).collect();
            if let Some(m) = &expression {
                g.extend(m.gene_names().map(str::to_string));
            }
            g.into_iter().collect()
        }
    };

    let metadata = match root.get("metadata").and_then(Value::as_object) {
        Some(m) => normalize_metadata(m),
        None => {
            warnings.push(ValidationWarning::MissingMetadata);
            DatasetMetadata {
                name: "Untitled dataset".to_string(),
                ..Default::default()
            }
        }
    };

    let annotation_options = match root.get("annotationOptions").and_then(Value::as_array) {
        Some(arr) => arr.iter().filter_map(as_string).collect(),
        None => cells
            .first()
            .map(|c| {
                c.metadata
                    .iter()
                    .filter(|(_, v)| v.is_text())
                    .map(|(k, _)| k.clone())
                    .collect()
            })
            .unwrap_or_default(),
    };

    for w in &warnings {
        warn!("{w}");
    }

    let mut dataset = Dataset::new(metadata, cells, genes, clusters, de, expression, annotation_options);
    dataset.metadata.gene_count = dataset.genes.len();
    Ok(LoadedDataset { dataset, warnings })
}

/// With `strict`, coordinates and cluster must be JSON numbers; otherwise
/// numeric strings are accepted too.
fn normalize_cell(index: usize, v: &Value, strict: bool) -> Result<Cell, Vec<ValidationError>> {
    let Some(obj) = v.as_object() else {
        return Err(vec![ValidationError::CellNotAnObject { index }]);
    };
    let number = |field: &str| {
        let v = obj.get(field);
        if strict {
            v.and_then(Value::as_f64).filter(|x| x.is_finite())
        } else {
            as_f64(v)
        }
    };
    let mut errors = Vec::new();
    let x = number("x");
    let y = number("y");
    if x.is_none() {
        errors.push(ValidationError::NonNumericField { index, field: "x" });
    }
    if y.is_none() {
        errors.push(ValidationError::NonNumericField { index, field: "y" });
    }
    let cluster = match number("cluster") {
        None => {
            errors.push(ValidationError::NonNumericField { index, field: "cluster" });
            None
        }
        Some(c) => {
            let id = as_cluster_id(c);
            if id.is_none() {
                errors.push(ValidationError::InvalidClusterId { index });
            }
            id
        }
    };
    let (Some(x), Some(y), Some(cluster)) = (x, y, cluster) else {
        return Err(errors);
    };
    let id = obj
        .get("id")
        .and_then(as_string)
        .unwrap_or_else(|| format!("cell_{index}"));
    let metadata = obj
        .get("metadata")
        .and_then(Value::as_object)
        .map(normalize_meta_map)
        .unwrap_or_default();
    Ok(Cell {
        id,
        x,
        y,
        cluster,
        metadata,
    })
}

fn normalize_meta_map(m: &Map<String, Value>) -> BTreeMap<String, MetaValue> {
    m.iter()
        .filter_map(|(k, v)| {
            let mv = match v {
                Value::Null => return None,
                Value::Number(n) => MetaValue::Number(n.as_f64()?),
                Value::String(s) => MetaValue::Text(s.clone()),
                Value::Bool(b) => MetaValue::Text(b.to_string()),
                other => MetaValue::Text(other.to_string()),
            };
            Some((k.clone(), mv))
        })
        .collect()
}

fn normalize_cluster(
    index: usize,
    v: &Value,
    errors: &mut Vec<ValidationError>,
) -> Option<(ClusterInfo, Option<usize>)> {
    let Some(id) = v
        .as_object()
        .and_then(|o| as_f64(o.get("id")))
        .and_then(as_cluster_id)
    else {
        errors.push(ValidationError::ClusterNotAnObject { index });
        return None;
    };
    let name = v
        .get("name")
        .and_then(as_string)
        .unwrap_or_else(|| format!("Cluster {id}"));
    let declared = as_f64(v.get("cellCount")).map(|n| n.max(0.0) as usize);
    let color = v.get("color").and_then(Value::as_str).unwrap_or("").to_string();
    Some((
        ClusterInfo {
            id,
            name,
            cell_count: 0,
            color,
        },
        declared,
    ))
}

/// Adds entries for clusters referenced only by cells, fills unusable colors,
/// and reports declared counts that disagree with the cells.
fn reconcile_clusters(
    cells: &[Cell],
    declared: Vec<(ClusterInfo, Option<usize>)>,
    warnings: &mut Vec<ValidationWarning>,
) -> Vec<ClusterInfo> {
    let mut actual: HashMap<ClusterId, usize> = HashMap::new();
    for c in cells {
        *actual.entry(c.cluster).or_default() += 1;
    }

    let mut clusters = Vec::with_capacity(declared.len());
    let mut known = BTreeSet::new();
    for (info, count) in declared {
        if !known.insert(info.id) {
            debug!("duplicate cluster entry {} ignored", info.id);
            continue;
        }
        let n = actual.get(&info.id).copied().unwrap_or(0);
        if let Some(d) = count {
            if d != n {
                warnings.push(ValidationWarning::CellCountMismatch {
                    cluster: info.id,
                    declared: d,
                    actual: n,
                });
            }
        }
        clusters.push(info);
    }
    let missing: BTreeSet<ClusterId> = actual.keys().copied().filter(|id| !known.contains(id)).collect();
    for id in missing {
        warnings.push(ValidationWarning::UnknownCluster { cluster: id });
        clusters.push(ClusterInfo {
            id,
            name: format!("Cluster {id}"),
            cell_count: 0,
            color: String::new(),
        });
    }

    let n = clusters.len();
    for (i, c) in clusters.iter_mut().enumerate() {
        if parse_css_color(&c.color).is_none() {
            if !c.color.is_empty() || known.contains(&c.id) {
                warnings.push(ValidationWarning::MissingClusterColor { cluster: c.id });
            }
            c.color = default_cluster_color(i, n);
        }
    }
    clusters
}

fn normalize_de(v: &Value) -> Option<DeRecord> {
    let o = v.as_object()?;
    let row = DeRecord {
        gene: o.get("gene").and_then(as_string)?,
        cluster: o.get("cluster").and_then(as_string)?,
        log_fc: as_f64(o.get("logFC"))?,
        p_value: as_f64(o.get("pValue")).unwrap_or(1.0),
        p_adj: as_f64(o.get("pAdj")).unwrap_or(1.0),
    };
    Some(row)
}

fn normalize_expression(m: &Map<String, Value>) -> ExpressionMatrix {
    let genes = m
        .iter()
        .map(|(gene, cells)| {
            let values: ExpressionMap = cells
                .as_object()
                .map(|cells| {
                    cells
                        .iter()
                        .filter_map(|(id, v)| {
                            let x = as_f64(Some(v))?;
                            (x.is_finite() && x >= 0.0).then(|| (id.clone(), x))
                        })
                        .collect()
                })
                .unwrap_or_default();
            (gene.clone(), values)
        })
        .collect();
    ExpressionMatrix::new(genes)
}

fn normalize_metadata(m: &Map<String, Value>) -> DatasetMetadata {
    let text = |k: &str| m.get(k).and_then(as_string);
    DatasetMetadata {
        name: text("name").unwrap_or_else(|| "Untitled dataset".to_string()),
        description: text("description").unwrap_or_default(),
        organism: text("organism"),
        tissue: text("tissue"),
        source: text("source"),
        // counts are recomputed from the contents
        ..Default::default()
    }
}

/// Numbers, and strings that parse as numbers.
fn as_f64(v: Option<&Value>) -> Option<f64> {
    let x = match v? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    x.filter(|x| x.is_finite())
}

fn as_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_cluster_id(v: f64) -> Option<ClusterId> {
    (v >= 0.0 && v.fract() == 0.0 && v <= ClusterId::MAX as f64).then_some(v as ClusterId)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> Value {
        json!({
            "metadata": { "name": "pbmc", "description": "demo", "organism": "human" },
            "cells": [
                { "id": "AAAC-1", "x": 1.5, "y": -2, "cluster": 0, "metadata": { "sample": "s1", "nCount_RNA": 1200 } },
                { "id": 7, "x": "3.25", "y": 4, "cluster": "1", "metadata": { "sample": "s2", "nCount_RNA": 800 } }
            ],
            "genes": ["CD3E", "MS4A1"],
            "clusters": [
                { "id": 0, "name": "T", "cellCount": 1, "color": "hsl(0, 70%, 50%)" },
                { "id": 1, "name": "B", "cellCount": 1, "color": "rgb(0, 0, 255)" }
            ],
            "differentialExpression": [
                { "gene": "CD3E", "cluster": "T", "logFC": 2.1, "pValue": 1e-20, "pAdj": 1e-18 },
                { "gene": "MS4A1", "cluster": 1, "logFC": 3.0, "pValue": 1e-30, "pAdj": 1e-28 },
                { "gene": "bad" }
            ],
            "expression": { "CD3E": { "AAAC-1": 2.5 } }
        })
    }

    #[test]
    fn accepts_and_normalizes() {
        let loaded = dataset_from_value(&minimal()).unwrap();
        assert!(loaded.warnings.is_empty(), "{:?}", loaded.warnings);
        let ds = loaded.dataset;
        assert_eq!(ds.cells[1].id, "7");
        assert_eq!(ds.cells[1].x, 3.25);
        assert_eq!(ds.cells[1].cluster, 1);
        assert_eq!(ds.cells[0].meta("nCount_RNA"), Some(&MetaValue::Number(1200.0)));
        assert_eq!(ds.differential_expression.len(), 2);
        assert_eq!(ds.differential_expression[1].cluster, "1");
        assert_eq!(ds.gene_expression("CD3E").and_then(|m| m.get("AAAC-1")), Some(&2.5));
        assert_eq!(ds.metadata.organism.as_deref(), Some("human"));
        assert_eq!((ds.metadata.cell_count, ds.metadata.gene_count, ds.metadata.cluster_count), (2, 2, 2));
        // only string-typed keys of the first cell
        assert_eq!(ds.annotation_options, vec!["sample".to_string()]);
    }

    #[test]
    fn missing_cells_and_clusters_are_hard_errors() {
        let err = dataset_from_value(&json!({ "genes": [] })).unwrap_err();
        match err {
            LoadError::Invalid(errs) => {
                assert_eq!(errs, vec![ValidationError::MissingCells, ValidationError::MissingClusters])
            }
            other => panic!("unexpected {other}"),
        }
        let err = dataset_from_value(&json!({ "cells": [], "clusters": [] })).unwrap_err();
        assert!(matches!(err, LoadError::Invalid(e) if e == vec![ValidationError::EmptyCells]));
        assert!(matches!(
            dataset_from_value(&json!([1, 2])),
            Err(LoadError::Invalid(e)) if e == vec![ValidationError::NotAnObject]
        ));
    }

    #[test]
    fn first_cell_field_types_are_checked() {
        let v = json!({
            "cells": [{ "id": "a", "x": "left", "y": 1, "cluster": 0.5 }],
            "clusters": []
        });
        let Err(LoadError::Invalid(errs)) = dataset_from_value(&v) else {
            panic!("expected validation failure");
        };
        assert_eq!(
            errs,
            vec![
                ValidationError::NonNumericField { index: 0, field: "x" },
                ValidationError::InvalidClusterId { index: 0 },
            ]
        );
    }

    #[test]
    fn first_cell_needs_json_numbers() {
        let v = json!({
            "cells": [{ "id": "a", "x": "3.25", "y": 1, "cluster": "0" }],
            "clusters": []
        });
        let Err(LoadError::Invalid(errs)) = dataset_from_value(&v) else {
            panic!("expected validation failure");
        };
        assert_eq!(
            errs,
            vec![
                ValidationError::NonNumericField { index: 0, field: "x" },
                ValidationError::NonNumericField { index: 0, field: "cluster" },
            ]
        );
    }

    #[test]
    fn later_cells_are_coerced_or_dropped() {
        let v = json!({
            "cells": [
                { "id": "a", "x": 0, "y": 0, "cluster": 0 },
                { "id": "b", "x": null, "y": 1, "cluster": 0 },
                { "id": "c", "x": "2.5", "y": " 4 ", "cluster": "0" },
                "not a cell",
                { "id": "d", "x": 1, "y": 1, "cluster": -1 }
            ],
            "clusters": [{ "id": 0, "name": "zero", "color": "#112233" }]
        });
        let loaded = dataset_from_value(&v).unwrap();
        let ids: Vec<&str> = loaded.dataset.cells.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!((loaded.dataset.cells[1].x, loaded.dataset.cells[1].y), (2.5, 4.0));
        let dropped: Vec<&ValidationError> = loaded
            .warnings
            .iter()
            .filter_map(|w| match w {
                ValidationWarning::DroppedCell { cause } => Some(cause),
                _ => None,
            })
            .collect();
        assert_eq!(
            dropped,
            vec![
                &ValidationError::NonNumericField { index: 1, field: "x" },
                &ValidationError::CellNotAnObject { index: 3 },
                &ValidationError::InvalidClusterId { index: 4 },
            ]
        );
    }

    #[test]
    fn optional_parts_only_warn() {
        let v = json!({
            "cells": [
                { "id": "a", "x": 0, "y": 0, "cluster": 0, "metadata": { "sample": "s1" } },
                { "id": "a", "x": 1, "y": 1, "cluster": 3 }
            ],
            "clusters": [{ "id": 0, "name": "zero", "cellCount": 5, "color": "chartreuse-ish" }],
            "differentialExpression": [{ "gene": "GZMB", "cluster": "zero", "logFC": 1.0, "pValue": 0.0, "pAdj": 0.0 }]
        });
        let loaded = dataset_from_value(&v).unwrap();
        let w = &loaded.warnings;
        assert!(w.contains(&ValidationWarning::MissingGenes));
        assert!(w.contains(&ValidationWarning::MissingMetadata));
        assert!(w.contains(&ValidationWarning::DuplicateCellId { id: "a".into() }));
        assert!(w.contains(&ValidationWarning::UnknownCluster { cluster: 3 }));
        assert!(w.contains(&ValidationWarning::MissingClusterColor { cluster: 0 }));
        assert!(w.contains(&ValidationWarning::CellCountMismatch {
            cluster: 0,
            declared: 5,
            actual: 1
        }));
        let ds = loaded.dataset;
        assert_eq!(ds.genes, vec!["GZMB".to_string()]);
        assert_eq!(ds.metadata.name, "Untitled dataset");
        assert_eq!(ds.cluster(3).map(|c| c.cell_count), Some(1));
        assert!(ds.clusters.iter().all(|c| parse_css_color(&c.color).is_some()));
    }

    #[test]
    fn malformed_json_is_a_load_error() {
        assert!(matches!(parse_dataset_json("{ \"cells\": ["), Err(LoadError::Json(_))));
    }
}
