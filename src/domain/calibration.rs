//! Calibration anchors, records and the validated calibration table.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use generational_arena::Index;
use itertools::Itertools;
use tracing::{debug, instrument};

use crate::domain::arena::{NodeId, NodeNumbering, PhyloTree};
use crate::domain::error::{DomainError, ValidationError};

/// What a calibration is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    /// The root of the rooted tree (node `tip_count + 1`)
    Root,
    /// Most recent common ancestor of at least two taxa
    Mrca(Vec<String>),
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anchor::Root => write!(f, "root"),
            Anchor::Mrca(taxa) => write!(f, "mrca({})", taxa.join(", ")),
        }
    }
}

/// A declared calibration, before resolution against a tree.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationSpec {
    pub anchor: Anchor,
    pub min_age: f64,
    pub max_age: f64,
    /// Soft bounds may be exceeded under a penalty; hard bounds may not
    pub soft: bool,
}

impl CalibrationSpec {
    pub fn hard(anchor: Anchor, min_age: f64, max_age: f64) -> Self {
        Self {
            anchor,
            min_age,
            max_age,
            soft: false,
        }
    }

    pub fn soft(anchor: Anchor, min_age: f64, max_age: f64) -> Self {
        Self {
            anchor,
            min_age,
            max_age,
            soft: true,
        }
    }
}

/// A calibration resolved to a node of the rooted tree.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationRecord {
    pub node: NodeId,
    pub min_age: f64,
    pub max_age: f64,
    pub soft: bool,
    pub anchor: Anchor,
}

impl CalibrationRecord {
    pub fn contains(&self, age: f64) -> bool {
        age >= self.min_age && age <= self.max_age
    }

    /// Distance of `age` outside `[min, max]`, zero inside.
    pub fn violation(&self, age: f64) -> f64 {
        if age < self.min_age {
            self.min_age - age
        } else if age > self.max_age {
            age - self.max_age
        } else {
            0.0
        }
    }

    pub fn bound_kind(&self) -> &'static str {
        if self.soft {
            "soft"
        } else {
            "hard"
        }
    }
}

/// Ordered, validated calibration records.
///
/// Invariants: `0 <= min <= max` with finite ages, every node is internal,
/// node ids are unique, and records keep their declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationTable {
    records: Vec<CalibrationRecord>,
}

impl CalibrationTable {
    /// Resolve each anchor against the rooted tree and validate the result.
    #[instrument(level = "debug", skip_all, fields(n = specs.len()))]
    pub fn build(tree: &PhyloTree, specs: &[CalibrationSpec]) -> Result<Self, DomainError> {
        let numbering = tree.numbering();
        let mut records = Vec::with_capacity(specs.len());
        for (i, spec) in specs.iter().enumerate() {
            let position = i + 1;
            let node = resolve_anchor(tree, &numbering, &spec.anchor, position)?;
            debug!(
                "calibration #{}: {} -> node {} [{}, {}]",
                position, spec.anchor, node, spec.min_age, spec.max_age
            );
            records.push(CalibrationRecord {
                node,
                min_age: spec.min_age,
                max_age: spec.max_age,
                soft: spec.soft,
                anchor: spec.anchor.clone(),
            });
        }
        validate(&numbering, &records)?;
        Ok(Self { records })
    }

    /// Build from four parallel columns aligned by position.
    ///
    /// All columns must have the same length; nothing is truncated.
    pub fn from_columns(
        tree: &PhyloTree,
        nodes: &[NodeId],
        min_ages: &[f64],
        max_ages: &[f64],
        soft: &[bool],
    ) -> Result<Self, DomainError> {
        let expected = nodes.len();
        for (column, actual) in [
            ("min_age", min_ages.len()),
            ("max_age", max_ages.len()),
            ("soft", soft.len()),
        ] {
            if actual != expected {
                return Err(ValidationError::LengthMismatch {
                    column,
                    expected,
                    actual,
                }
                .into());
            }
        }

        let numbering = tree.numbering();
        let root = numbering.root();
        let records: Vec<CalibrationRecord> = nodes
            .iter()
            .zip(min_ages)
            .zip(max_ages)
            .zip(soft)
            .map(|(((&node, &min_age), &max_age), &soft)| CalibrationRecord {
                node,
                min_age,
                max_age,
                soft,
                anchor: if node == root {
                    Anchor::Root
                } else {
                    numbering
                        .index(node)
                        .map(|idx| Anchor::Mrca(tree.descendant_labels(idx)))
                        .unwrap_or_else(|| Anchor::Mrca(Vec::new()))
                },
            })
            .collect();
        validate(&numbering, &records)?;
        Ok(Self { records })
    }

    pub fn records(&self) -> &[CalibrationRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CalibrationRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, node: NodeId) -> Option<&CalibrationRecord> {
        self.records.iter().find(|r| r.node == node)
    }

    /// Records keyed by node, for lookups during estimation.
    pub fn by_node(&self) -> HashMap<NodeId, &CalibrationRecord> {
        self.records.iter().map(|r| (r.node, r)).collect()
    }

    /// Largest finite maximum age among all records.
    pub fn oldest_max_age(&self) -> Option<f64> {
        self.records
            .iter()
            .map(|r| r.max_age)
            .filter(|a| a.is_finite())
            .fold(None, |acc, a| Some(acc.map_or(a, |m: f64| m.max(a))))
    }

    /// Printable rows: position, node, anchor, min, max, bound kind.
    pub fn describe(&self) -> Vec<String> {
        self.records
            .iter()
            .enumerate()
            .map(|(i, r)| {
                format!(
                    "#{:<2} node {:>3}  {:<32} [{}, {}] {}",
                    i + 1,
                    r.node,
                    r.anchor.to_string(),
                    r.min_age,
                    r.max_age,
                    r.bound_kind()
                )
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a CalibrationTable {
    type Item = &'a CalibrationRecord;
    type IntoIter = std::slice::Iter<'a, CalibrationRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

fn resolve_anchor(
    tree: &PhyloTree,
    numbering: &NodeNumbering,
    anchor: &Anchor,
    position: usize,
) -> Result<NodeId, DomainError> {
    let context = format!("calibration #{}", position);
    match anchor {
        Anchor::Root => {
            if numbering.is_empty() {
                return Err(DomainError::taxon_set(context, "tree is empty"));
            }
            Ok(numbering.root())
        }
        Anchor::Mrca(taxa) => {
            let distinct: BTreeSet<&str> = taxa.iter().map(String::as_str).collect();
            if distinct.len() < 2 {
                return Err(DomainError::taxon_set(
                    context,
                    format!(
                        "an MRCA anchor needs at least two distinct taxa, got [{}]",
                        taxa.iter().join(", ")
                    ),
                ));
            }
            let tips = distinct
                .iter()
                .map(|name| {
                    tree.find_tip(name)
                        .ok_or_else(|| DomainError::unknown_taxon(*name, context.clone()))
                })
                .collect::<Result<Vec<Index>, _>>()?;
            let mrca = tree
                .mrca(&tips)
                .filter(|&idx| !tree.is_tip(idx))
                .ok_or_else(|| {
                    DomainError::taxon_set(context.clone(), "taxa do not resolve to an internal node")
                })?;
            numbering.id(mrca).ok_or_else(|| {
                DomainError::taxon_set(context, "resolved node is not part of the tree")
            })
        }
    }
}

fn validate(numbering: &NodeNumbering, records: &[CalibrationRecord]) -> Result<(), ValidationError> {
    let mut seen: HashMap<NodeId, usize> = HashMap::new();
    for (i, record) in records.iter().enumerate() {
        let position = i + 1;
        for (field, value) in [("min", record.min_age), ("max", record.max_age)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ValidationError::InvalidAge {
                    position,
                    field,
                    value,
                });
            }
        }
        if record.min_age > record.max_age {
            return Err(ValidationError::MinExceedsMax {
                position,
                min: record.min_age,
                max: record.max_age,
            });
        }
        if !numbering.is_internal(record.node) {
            return Err(ValidationError::NotInternal {
                position,
                node: record.node.0,
            });
        }
        if let Some(first) = seen.insert(record.node, position) {
            return Err(ValidationError::DuplicateNode {
                position,
                first,
                node: record.node.0,
            });
        }
    }
    Ok(())
}
