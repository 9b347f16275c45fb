use std::collections::{BTreeSet, HashMap};
use std::fmt;

use generational_arena::{Arena, Index};
use tracing::instrument;

/// Data payload for tree nodes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeData {
    /// Taxon label for tips; optional annotation for internal nodes
    pub label: Option<String>,
    /// Length of the edge leading to this node, None for the root or unannotated edges
    pub length: Option<f64>,
}

impl NodeData {
    pub fn tip(label: impl Into<String>, length: f64) -> Self {
        Self {
            label: Some(label.into()),
            length: Some(length),
        }
    }

    pub fn internal(length: Option<f64>) -> Self {
        Self {
            label: None,
            length,
        }
    }
}

impl fmt::Display for NodeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.label, self.length) {
            (Some(label), Some(len)) => write!(f, "{}:{}", label, len),
            (Some(label), None) => write!(f, "{}", label),
            (None, Some(len)) => write!(f, ":{}", len),
            (None, None) => write!(f, "*"),
        }
    }
}

/// Tree node in the arena-based phylogeny.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub data: NodeData,
    /// Index of parent node in the arena, None for the root
    pub parent: Option<Index>,
    /// Indices of child nodes in the arena, in left-to-right order
    pub children: Vec<Index>,
}

impl TreeNode {
    pub fn is_tip(&self) -> bool {
        self.children.is_empty()
    }
}

/// Stable public node number.
///
/// For a tree with N tips, tips are numbered `1..=N` left to right and internal
/// nodes `N+1..` in preorder, so the root is always `N+1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bidirectional map between arena indices and node numbers.
#[derive(Debug, Clone)]
pub struct NodeNumbering {
    tip_count: usize,
    by_id: Vec<Index>,
    ids: HashMap<Index, NodeId>,
}

impl NodeNumbering {
    pub fn tip_count(&self) -> usize {
        self.tip_count
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn id(&self, idx: Index) -> Option<NodeId> {
        self.ids.get(&idx).copied()
    }

    pub fn index(&self, id: NodeId) -> Option<Index> {
        id.0.checked_sub(1).and_then(|i| self.by_id.get(i)).copied()
    }

    pub fn is_internal(&self, id: NodeId) -> bool {
        id.0 > self.tip_count && id.0 <= self.by_id.len()
    }

    /// Root node number (`tip_count + 1`).
    pub fn root(&self) -> NodeId {
        NodeId(self.tip_count + 1)
    }

    /// Internal node numbers in ascending (preorder) order.
    pub fn internal_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (self.tip_count + 1..=self.by_id.len()).map(NodeId)
    }
}

/// Arena-based rooted phylogenetic tree.
///
/// Uses generational arena for memory-safe node references and O(1) lookups.
#[derive(Debug, Clone, Default)]
pub struct PhyloTree {
    arena: Arena<TreeNode>,
    root: Option<Index>,
}

impl PhyloTree {
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
            root: None,
        }
    }

    #[instrument(level = "trace", skip(self))]
    pub fn insert_node(&mut self, data: NodeData, parent: Option<Index>) -> Index {
        let node = TreeNode {
            data,
            parent,
            children: Vec::new(),
        };
        let node_idx = self.arena.insert(node);

        if let Some(parent_idx) = parent {
            if let Some(parent) = self.arena.get_mut(parent_idx) {
                parent.children.push(node_idx);
            }
        } else {
            self.root = Some(node_idx);
        }

        node_idx
    }

    pub fn get_node(&self, idx: Index) -> Option<&TreeNode> {
        self.arena.get(idx)
    }

    pub fn get_node_mut(&mut self, idx: Index) -> Option<&mut TreeNode> {
        self.arena.get_mut(idx)
    }

    pub fn root(&self) -> Option<Index> {
        self.root
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn is_tip(&self, idx: Index) -> bool {
        self.get_node(idx).map(TreeNode::is_tip).unwrap_or(false)
    }

    pub fn label(&self, idx: Index) -> Option<&str> {
        self.get_node(idx).and_then(|n| n.data.label.as_deref())
    }

    pub fn length(&self, idx: Index) -> Option<f64> {
        self.get_node(idx).and_then(|n| n.data.length)
    }

    pub fn parent(&self, idx: Index) -> Option<Index> {
        self.get_node(idx).and_then(|n| n.parent)
    }

    pub fn children(&self, idx: Index) -> &[Index] {
        self.get_node(idx)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// Preorder traversal, children left to right.
    pub fn iter(&self) -> TreeIterator<'_> {
        TreeIterator::new(self)
    }

    pub fn iter_postorder(&self) -> PostOrderIterator<'_> {
        PostOrderIterator::new(self)
    }

    /// Tip indices in left-to-right order.
    pub fn tips(&self) -> Vec<Index> {
        self.iter()
            .filter(|(_, node)| node.is_tip())
            .map(|(idx, _)| idx)
            .collect()
    }

    pub fn tip_count(&self) -> usize {
        self.iter().filter(|(_, node)| node.is_tip()).count()
    }

    /// Tip labels in left-to-right order; unlabeled tips are skipped.
    pub fn tip_labels(&self) -> Vec<String> {
        self.tips()
            .into_iter()
            .filter_map(|idx| self.label(idx).map(str::to_string))
            .collect()
    }

    pub fn find_tip(&self, label: &str) -> Option<Index> {
        self.iter()
            .find(|(_, node)| node.is_tip() && node.data.label.as_deref() == Some(label))
            .map(|(idx, _)| idx)
    }

    /// Compute tip-first, preorder node numbering.
    #[instrument(level = "trace", skip(self))]
    pub fn numbering(&self) -> NodeNumbering {
        let mut tips = Vec::new();
        let mut internals = Vec::new();
        for (idx, node) in self.iter() {
            if node.is_tip() {
                tips.push(idx);
            } else {
                internals.push(idx);
            }
        }
        let tip_count = tips.len();
        let by_id: Vec<Index> = tips.into_iter().chain(internals).collect();
        let ids = by_id
            .iter()
            .enumerate()
            .map(|(i, &idx)| (idx, NodeId(i + 1)))
            .collect();
        NodeNumbering {
            tip_count,
            by_id,
            ids,
        }
    }

    /// Path from `idx` up to the root, both included.
    pub fn ancestors(&self, idx: Index) -> Vec<Index> {
        let mut path = vec![idx];
        let mut current = idx;
        while let Some(parent) = self.parent(current) {
            path.push(parent);
            current = parent;
        }
        path
    }

    /// Most recent common ancestor of the given nodes.
    ///
    /// A single node is its own MRCA. Returns None for an empty slice or
    /// indices not in this tree.
    pub fn mrca(&self, nodes: &[Index]) -> Option<Index> {
        let (first, rest) = nodes.split_first()?;
        self.get_node(*first)?;
        let path = self.ancestors(*first);
        let mut highest_shared = 0;
        for &other in rest {
            self.get_node(other)?;
            let shared = self
                .ancestors(other)
                .into_iter()
                .find_map(|a| path.iter().position(|&p| p == a))?;
            highest_shared = highest_shared.max(shared);
        }
        path.get(highest_shared).copied()
    }

    /// Sum of edge lengths from the root down to `idx`; missing lengths count as zero.
    pub fn distance_from_root(&self, idx: Index) -> f64 {
        self.ancestors(idx)
            .into_iter()
            .filter(|&a| Some(a) != self.root)
            .filter_map(|a| self.length(a))
            .sum()
    }

    /// Largest root-to-tip distance.
    pub fn height(&self) -> f64 {
        self.tips()
            .into_iter()
            .map(|t| self.distance_from_root(t))
            .fold(0.0, f64::max)
    }

    /// Labels of the tips below `idx`, sorted.
    pub fn descendant_labels(&self, idx: Index) -> Vec<String> {
        let mut labels = Vec::new();
        let mut stack = vec![idx];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.get_node(current) {
                if node.is_tip() {
                    if let Some(label) = &node.data.label {
                        labels.push(label.clone());
                    }
                }
                stack.extend(node.children.iter().copied());
            }
        }
        labels.sort();
        labels
    }

    /// Set of clusters (sorted tip-label sets) defined by the internal nodes.
    ///
    /// Two rooted trees share a topology exactly when their cluster sets and
    /// tip sets are equal.
    pub fn clusters(&self) -> BTreeSet<Vec<String>> {
        self.iter()
            .filter(|(_, node)| !node.is_tip())
            .map(|(idx, _)| self.descendant_labels(idx))
            .collect()
    }

    pub fn same_topology(&self, other: &PhyloTree) -> bool {
        let mut a = self.tip_labels();
        let mut b = other.tip_labels();
        a.sort();
        b.sort();
        a == b && self.clusters() == other.clusters()
    }
}

pub struct TreeIterator<'a> {
    tree: &'a PhyloTree,
    stack: Vec<Index>,
}

impl<'a> TreeIterator<'a> {
    fn new(tree: &'a PhyloTree) -> Self {
        let mut stack = Vec::new();
        if let Some(root) = tree.root() {
            stack.push(root);
        }
        Self { tree, stack }
    }
}

impl<'a> Iterator for TreeIterator<'a> {
    type Item = (Index, &'a TreeNode);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(current_idx) = self.stack.pop() {
            if let Some(node) = self.tree.get_node(current_idx) {
                // Push children in reverse order for left-to-right traversal
                for &child in node.children.iter().rev() {
                    self.stack.push(child);
                }
                return Some((current_idx, node));
            }
        }
        None
    }
}

pub struct PostOrderIterator<'a> {
    tree: &'a PhyloTree,
    stack: Vec<(Index, bool)>,
}

impl<'a> PostOrderIterator<'a> {
    fn new(tree: &'a PhyloTree) -> Self {
        let mut stack = Vec::new();
        if let Some(root) = tree.root() {
            stack.push((root, false));
        }
        Self { tree, stack }
    }
}

impl<'a> Iterator for PostOrderIterator<'a> {
    type Item = (Index, &'a TreeNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((current_idx, visited)) = self.stack.pop() {
            if let Some(node) = self.tree.get_node(current_idx) {
                if !visited {
                    self.stack.push((current_idx, true));
                    for &child in node.children.iter().rev() {
                        self.stack.push((child, false));
                    }
                } else {
                    return Some((current_idx, node));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// ((A:1,B:2):3,C:4);
    fn small_tree() -> (PhyloTree, [Index; 5]) {
        let mut tree = PhyloTree::new();
        let root = tree.insert_node(NodeData::internal(None), None);
        let ab = tree.insert_node(NodeData::internal(Some(3.0)), Some(root));
        let a = tree.insert_node(NodeData::tip("A", 1.0), Some(ab));
        let b = tree.insert_node(NodeData::tip("B", 2.0), Some(ab));
        let c = tree.insert_node(NodeData::tip("C", 4.0), Some(root));
        (tree, [root, ab, a, b, c])
    }

    #[test]
    fn given_tree_when_numbering_then_tips_first_and_root_follows() {
        let (tree, [root, ab, a, b, c]) = small_tree();
        let numbering = tree.numbering();

        assert_eq!(numbering.tip_count(), 3);
        assert_eq!(numbering.id(a), Some(NodeId(1)));
        assert_eq!(numbering.id(b), Some(NodeId(2)));
        assert_eq!(numbering.id(c), Some(NodeId(3)));
        assert_eq!(numbering.id(root), Some(NodeId(4)));
        assert_eq!(numbering.id(ab), Some(NodeId(5)));
        assert_eq!(numbering.root(), NodeId(4));
        assert_eq!(numbering.index(NodeId(5)), Some(ab));
        assert!(numbering.is_internal(NodeId(5)));
        assert!(!numbering.is_internal(NodeId(2)));
        assert!(!numbering.is_internal(NodeId(6)));
    }

    #[test]
    fn given_tips_when_mrca_then_returns_highest_shared_ancestor() {
        let (tree, [root, ab, a, b, c]) = small_tree();

        assert_eq!(tree.mrca(&[a, b]), Some(ab));
        assert_eq!(tree.mrca(&[a, c]), Some(root));
        assert_eq!(tree.mrca(&[b, a, c]), Some(root));
        assert_eq!(tree.mrca(&[a]), Some(a));
        assert_eq!(tree.mrca(&[]), None);
    }

    #[test]
    fn given_tree_when_measuring_then_distances_sum_edges() {
        let (tree, [_, _, a, b, c]) = small_tree();

        assert_eq!(tree.distance_from_root(a), 4.0);
        assert_eq!(tree.distance_from_root(b), 5.0);
        assert_eq!(tree.distance_from_root(c), 4.0);
        assert_eq!(tree.height(), 5.0);
    }

    #[test]
    fn given_tree_when_iterating_postorder_then_children_precede_parent() {
        let (tree, [root, ab, a, b, c]) = small_tree();
        let order: Vec<Index> = tree.iter_postorder().map(|(idx, _)| idx).collect();

        assert_eq!(order, vec![a, b, ab, c, root]);
    }

    #[test]
    fn given_same_clusters_in_other_order_when_comparing_then_same_topology() {
        let (left, _) = small_tree();
        let mut right = PhyloTree::new();
        let root = right.insert_node(NodeData::internal(None), None);
        right.insert_node(NodeData::tip("C", 1.0), Some(root));
        let ba = right.insert_node(NodeData::internal(Some(1.0)), Some(root));
        right.insert_node(NodeData::tip("B", 1.0), Some(ba));
        right.insert_node(NodeData::tip("A", 1.0), Some(ba));

        assert!(left.same_topology(&right));
        assert_eq!(left.tip_labels(), vec!["A", "B", "C"]);
        assert_eq!(right.tip_labels(), vec!["C", "B", "A"]);
    }
}
