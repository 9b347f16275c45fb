//! Outgroup rooting.

use std::collections::{BTreeSet, HashMap};

use generational_arena::Index;
use tracing::{debug, instrument, warn};

use crate::domain::arena::{NodeData, PhyloTree};
use crate::domain::error::DomainError;

/// Where the new root goes: on the edge between `outgroup_side` and `ingroup_side`.
#[derive(Debug, Clone, Copy)]
struct RootEdge {
    outgroup_side: Index,
    ingroup_side: Index,
    length: Option<f64>,
}

type Adjacency = HashMap<Index, Vec<(Index, Option<f64>)>>;

impl PhyloTree {
    /// Re-root the tree on the outgroup.
    ///
    /// The tree is treated as unrooted. If some edge separates exactly the
    /// outgroup from the remaining tips, the new root is placed at its midpoint,
    /// giving one branch to the outgroup clade and one to the ingroup clade. A
    /// single outgroup tip is therefore rooted on its own parent edge. Otherwise
    /// the root goes on the edge above the outgroup MRCA in the current rooting.
    #[instrument(level = "debug", skip(self))]
    pub fn root_on_outgroup(&mut self, outgroup: &[String]) -> Result<(), DomainError> {
        let members = self.resolve_outgroup(outgroup)?;
        let edge = match self.find_split_edge(&members) {
            Some(edge) => edge,
            None => self.mrca_edge(&members)?,
        };
        debug!(
            "rooting between {:?} and {:?}",
            self.label(edge.outgroup_side),
            self.label(edge.ingroup_side)
        );
        *self = self.rebuild_rooted(edge);
        Ok(())
    }

    fn resolve_outgroup(&self, outgroup: &[String]) -> Result<BTreeSet<Index>, DomainError> {
        if outgroup.is_empty() {
            return Err(DomainError::taxon_set("outgroup", "no taxa given"));
        }
        let mut members = BTreeSet::new();
        for name in outgroup {
            let idx = self
                .find_tip(name)
                .ok_or_else(|| DomainError::unknown_taxon(name, "outgroup"))?;
            members.insert(idx);
        }
        if members.len() >= self.tip_count() {
            return Err(DomainError::taxon_set(
                "outgroup",
                "outgroup contains every tip, nothing is left for the ingroup",
            ));
        }
        Ok(members)
    }

    /// Edge whose removal splits the tips into exactly the outgroup and the rest.
    fn find_split_edge(&self, members: &BTreeSet<Index>) -> Option<RootEdge> {
        let total = self.tip_count();
        let wanted = members.len();
        // (tips below, outgroup tips below) per node
        let mut counts: HashMap<Index, (usize, usize)> = HashMap::new();
        for (idx, node) in self.iter_postorder() {
            let count = if node.is_tip() {
                (1, usize::from(members.contains(&idx)))
            } else {
                node.children
                    .iter()
                    .filter_map(|c| counts.get(c))
                    .fold((0, 0), |acc, c| (acc.0 + c.0, acc.1 + c.1))
            };
            counts.insert(idx, count);
        }

        self.iter()
            .filter_map(|(idx, node)| node.parent.map(|p| (idx, p, node.data.length)))
            .find_map(|(child, parent, length)| {
                let (below, outgroup_below) = counts.get(&child).copied()?;
                if below == wanted && outgroup_below == wanted {
                    Some(RootEdge {
                        outgroup_side: child,
                        ingroup_side: parent,
                        length,
                    })
                } else if outgroup_below == 0 && below == total - wanted {
                    Some(RootEdge {
                        outgroup_side: parent,
                        ingroup_side: child,
                        length,
                    })
                } else {
                    None
                }
            })
    }

    fn mrca_edge(&self, members: &BTreeSet<Index>) -> Result<RootEdge, DomainError> {
        let tips: Vec<Index> = members.iter().copied().collect();
        let mrca = self
            .mrca(&tips)
            .ok_or_else(|| DomainError::taxon_set("outgroup", "no common ancestor"))?;
        let parent = self.parent(mrca).ok_or_else(|| {
            DomainError::taxon_set(
                "outgroup",
                "outgroup is not monophyletic and its common ancestor is already the root",
            )
        })?;
        warn!(
            "outgroup is not monophyletic; rooting above its common ancestor ({} tips)",
            self.descendant_labels(mrca).len()
        );
        Ok(RootEdge {
            outgroup_side: mrca,
            ingroup_side: parent,
            length: self.length(mrca),
        })
    }

    fn adjacency(&self) -> Adjacency {
        let mut adjacency: Adjacency = HashMap::new();
        for (idx, node) in self.iter() {
            let entry = adjacency.entry(idx).or_default();
            for &child in &node.children {
                entry.push((child, self.length(child)));
            }
            if let Some(parent) = node.parent {
                entry.push((parent, node.data.length));
            }
        }
        adjacency
    }

    fn rebuild_rooted(&self, edge: RootEdge) -> PhyloTree {
        let adjacency = self.adjacency();
        let half = edge.length.map(|l| l / 2.0);

        let mut rooted = PhyloTree::new();
        let root = rooted.insert_node(NodeData::internal(None), None);
        self.copy_away_from(
            &adjacency,
            edge.outgroup_side,
            edge.ingroup_side,
            half,
            root,
            &mut rooted,
        );
        self.copy_away_from(
            &adjacency,
            edge.ingroup_side,
            edge.outgroup_side,
            half,
            root,
            &mut rooted,
        );
        rooted.center_root();
        rooted
    }

    /// Place the root at the midpoint of the path between its two children.
    ///
    /// A split edge next to a suppressed bifurcating root is the merge of the
    /// two old root edges, so only one half picks up the suppressed length.
    fn center_root(&mut self) {
        let Some(root) = self.root() else { return };
        let sides: Vec<Index> = self.children(root).to_vec();
        let [first, second] = sides.as_slice() else {
            return;
        };
        let (Some(a), Some(b)) = (self.length(*first), self.length(*second)) else {
            return;
        };
        let half = (a + b) / 2.0;
        for side in [*first, *second] {
            if let Some(node) = self.get_node_mut(side) {
                node.data.length = Some(half);
            }
        }
    }

    /// Copy `node` and everything reachable without passing `from`.
    ///
    /// Nodes left with a single child (a former root) are suppressed and their
    /// edge lengths merged.
    fn copy_away_from(
        &self,
        adjacency: &Adjacency,
        node: Index,
        from: Index,
        length: Option<f64>,
        new_parent: Index,
        rooted: &mut PhyloTree,
    ) {
        let onward: Vec<(Index, Option<f64>)> = adjacency
            .get(&node)
            .map(|n| n.iter().copied().filter(|(next, _)| *next != from).collect())
            .unwrap_or_default();

        if let [(only, next_length)] = onward.as_slice() {
            let merged = match (length, *next_length) {
                (Some(a), Some(b)) => Some(a + b),
                (a, b) => a.or(b),
            };
            self.copy_away_from(adjacency, *only, node, merged, new_parent, rooted);
            return;
        }

        let label = self.label(node).map(str::to_string);
        let copied = rooted.insert_node(NodeData { label, length }, Some(new_parent));
        for (next, next_length) in onward {
            self.copy_away_from(adjacency, next, node, next_length, copied, rooted);
        }
    }
}
