//! Terminal rendering of trees via `termtree`.

use generational_arena::Index;
use termtree::Tree;

use crate::domain::arena::{NodeNumbering, PhyloTree};
use crate::domain::newick::format_length;

pub trait TreeDisplay {
    fn to_tree_string(&self) -> Tree<String>;
}

impl TreeDisplay for PhyloTree {
    /// Each line shows the node number, the tip label (if any) and the edge length.
    fn to_tree_string(&self) -> Tree<String> {
        let Some(root) = self.root() else {
            return Tree::new("Empty tree".to_string());
        };
        let numbering = self.numbering();

        fn build(tree: &PhyloTree, numbering: &NodeNumbering, idx: Index) -> Tree<String> {
            let leaves: Vec<Tree<String>> = tree
                .children(idx)
                .iter()
                .map(|&child| build(tree, numbering, child))
                .collect();
            Tree::new(node_line(tree, numbering, idx)).with_leaves(leaves)
        }

        build(self, &numbering, root)
    }
}

fn node_line(tree: &PhyloTree, numbering: &NodeNumbering, idx: Index) -> String {
    let id = numbering
        .id(idx)
        .map(|id| format!("[{}]", id))
        .unwrap_or_default();
    let mut line = match tree.label(idx) {
        Some(label) => format!("{} {}", id, label),
        None => id,
    };
    if let Some(length) = tree.length(idx) {
        line.push_str(&format!(" :{}", format_length(length)));
    }
    line
}
