//! Rectangular phylogram layout in tree coordinates.

use std::collections::HashMap;

use generational_arena::Index;

use crate::domain::PhyloTree;

/// Placement of one node: `x` is the distance from the root in time units,
/// `row` the vertical slot (tips occupy `0..tip_count`).
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub index: Index,
    pub parent: Option<Index>,
    pub x: f64,
    pub row: f64,
    pub label: Option<String>,
    pub is_tip: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub root_age: f64,
    pub tip_count: usize,
    /// Preorder
    pub nodes: Vec<Placement>,
    positions: HashMap<Index, (f64, f64)>,
}

impl Layout {
    pub fn of(tree: &PhyloTree) -> Self {
        let mut x: HashMap<Index, f64> = HashMap::new();
        for (idx, node) in tree.iter() {
            let parent_x = node.parent.and_then(|p| x.get(&p).copied()).unwrap_or(0.0);
            let own = if node.parent.is_some() {
                node.data.length.unwrap_or(0.0)
            } else {
                0.0
            };
            x.insert(idx, parent_x + own);
        }

        let mut rows: HashMap<Index, f64> = HashMap::new();
        let mut next_tip = 0usize;
        for (idx, node) in tree.iter() {
            if node.is_tip() {
                rows.insert(idx, next_tip as f64);
                next_tip += 1;
            }
        }
        for (idx, node) in tree.iter_postorder() {
            if !node.is_tip() {
                let child_rows: Vec<f64> = node
                    .children
                    .iter()
                    .filter_map(|c| rows.get(c).copied())
                    .collect();
                let mean = child_rows.iter().sum::<f64>() / child_rows.len().max(1) as f64;
                rows.insert(idx, mean);
            }
        }

        let nodes: Vec<Placement> = tree
            .iter()
            .map(|(idx, node)| Placement {
                index: idx,
                parent: node.parent,
                x: x.get(&idx).copied().unwrap_or(0.0),
                row: rows.get(&idx).copied().unwrap_or(0.0),
                label: node.data.label.clone(),
                is_tip: node.is_tip(),
            })
            .collect();
        let root_age = nodes
            .iter()
            .filter(|n| n.is_tip)
            .map(|n| n.x)
            .fold(0.0, f64::max);
        let positions = nodes.iter().map(|n| (n.index, (n.x, n.row))).collect();

        Self {
            root_age,
            tip_count: next_tip,
            nodes,
            positions,
        }
    }

    /// `(x, row)` of a node.
    pub fn position(&self, idx: Index) -> Option<(f64, f64)> {
        self.positions.get(&idx).copied()
    }

    pub fn tips(&self) -> impl Iterator<Item = &Placement> {
        self.nodes.iter().filter(|n| n.is_tip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::parse_newick;
    use approx::assert_relative_eq;

    #[test]
    fn given_timetree_when_laying_out_then_tips_at_present_and_parents_centered() {
        let tree = parse_newick("((A:10,B:10):10,(C:5,D:5):15);", "t").unwrap();

        let layout = Layout::of(&tree);

        assert_eq!(layout.tip_count, 4);
        assert_relative_eq!(layout.root_age, 20.0);
        for tip in layout.tips() {
            assert_relative_eq!(tip.x, 20.0);
        }
        let root = tree.root().unwrap();
        let (root_x, root_row) = layout.position(root).unwrap();
        assert_relative_eq!(root_x, 0.0);
        assert_relative_eq!(root_row, 1.5);

        let ab = tree.children(root)[0];
        let (ab_x, ab_row) = layout.position(ab).unwrap();
        assert_relative_eq!(ab_x, 10.0);
        assert_relative_eq!(ab_row, 0.5);
    }

    #[test]
    fn given_tips_when_laying_out_then_rows_follow_tree_order() {
        let tree = parse_newick("(C:1,(A:0.5,B:0.5):0.5);", "t").unwrap();

        let layout = Layout::of(&tree);

        let order: Vec<(&str, f64)> = layout
            .tips()
            .map(|t| (t.label.as_deref().unwrap_or(""), t.row))
            .collect();
        assert_eq!(order, vec![("C", 0.0), ("A", 1.0), ("B", 2.0)]);
    }
}
