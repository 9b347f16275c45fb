//! Newick reader and writer.
//!
//! Supported grammar: nested parentheses, tip and internal labels, quoted labels
//! (`'it''s'`), `:length` on any node and `[...]` comments. Exactly one tree per
//! input, terminated by `;`.

use std::collections::HashMap;

use generational_arena::Index;

use crate::domain::arena::{NodeData, PhyloTree};
use crate::domain::error::DomainError;

/// Characters that end an unquoted label.
const DELIMITERS: &[char] = &['(', ')', ',', ':', ';', '[', ']', '\''];

/// Parse a single Newick tree.
///
/// `source_name` only appears in error messages (usually the file path).
pub fn parse_newick(input: &str, source_name: &str) -> Result<PhyloTree, DomainError> {
    let mut parser = NewickParser::new(input, source_name);
    parser.parse()
}

/// Serialize a tree to a single Newick line terminated by `;`.
pub fn write_newick(tree: &PhyloTree) -> String {
    write_newick_with(tree, |label| quote_label(label))
}

/// Serialize with a custom tip label mapping (used for Nexus translate tables).
pub fn write_newick_with<F>(tree: &PhyloTree, tip_label: F) -> String
where
    F: Fn(&str) -> String,
{
    let mut out = String::new();
    if let Some(root) = tree.root() {
        write_subtree(tree, root, &tip_label, &mut out);
    }
    out.push(';');
    out
}

fn write_subtree<F>(tree: &PhyloTree, idx: Index, tip_label: &F, out: &mut String)
where
    F: Fn(&str) -> String,
{
    let Some(node) = tree.get_node(idx) else {
        return;
    };
    if node.is_tip() {
        if let Some(label) = &node.data.label {
            out.push_str(&tip_label(label));
        }
    } else {
        out.push('(');
        for (i, &child) in node.children.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            write_subtree(tree, child, tip_label, out);
        }
        out.push(')');
        if let Some(label) = &node.data.label {
            out.push_str(&quote_label(label));
        }
    }
    if let Some(length) = node.data.length {
        out.push(':');
        out.push_str(&format_length(length));
    }
}

/// Shortest representation that parses back to the same `f64`.
pub fn format_length(length: f64) -> String {
    // avoid "-0"
    if length == 0.0 {
        return "0".to_string();
    }
    format!("{}", length)
}

/// Quote a label if it contains whitespace or Newick punctuation.
pub fn quote_label(label: &str) -> String {
    let needs_quotes =
        label.is_empty() || label.chars().any(|c| c.is_whitespace() || DELIMITERS.contains(&c));
    if needs_quotes {
        format!("'{}'", label.replace('\'', "''"))
    } else {
        label.to_string()
    }
}

struct NewickParser<'a> {
    input: &'a str,
    source_name: &'a str,
    pos: usize,
    tree: PhyloTree,
    seen_tips: HashMap<String, usize>,
}

impl<'a> NewickParser<'a> {
    fn new(input: &'a str, source_name: &'a str) -> Self {
        Self {
            input,
            source_name,
            pos: 0,
            tree: PhyloTree::new(),
            seen_tips: HashMap::new(),
        }
    }

    fn parse(&mut self) -> Result<PhyloTree, DomainError> {
        self.skip_insignificant()?;
        if self.peek().is_none() {
            return Err(self.error("empty input, expected a tree"));
        }
        self.parse_subtree(None)?;
        self.skip_insignificant()?;
        match self.peek() {
            Some(';') => self.pos += 1,
            Some(c) => return Err(self.error(format!("unexpected '{}', expected ';'", c))),
            None => return Err(self.error("missing terminating ';'")),
        }
        self.skip_insignificant()?;
        if let Some(c) = self.peek() {
            let message = if c == '(' {
                "more than one tree in input".to_string()
            } else {
                format!("unexpected trailing content starting with '{}'", c)
            };
            return Err(self.error(message));
        }
        Ok(std::mem::take(&mut self.tree))
    }

    fn parse_subtree(&mut self, parent: Option<Index>) -> Result<Index, DomainError> {
        self.skip_insignificant()?;
        if self.peek() == Some('(') {
            self.pos += 1;
            let node = self.tree.insert_node(NodeData::default(), parent);
            loop {
                self.parse_subtree(Some(node))?;
                self.skip_insignificant()?;
                match self.peek() {
                    Some(',') => self.pos += 1,
                    Some(')') => {
                        self.pos += 1;
                        break;
                    }
                    Some(c) => {
                        return Err(self.error(format!("unexpected '{}', expected ',' or ')'", c)))
                    }
                    None => return Err(self.error("unbalanced parentheses")),
                }
            }
            let label = self.parse_label()?;
            let length = self.parse_length()?;
            if let Some(data) = self.tree.get_node_mut(node).map(|n| &mut n.data) {
                data.label = label;
                data.length = length;
            }
            Ok(node)
        } else {
            let start = self.pos;
            let label = self
                .parse_label()?
                .ok_or_else(|| self.error("expected a taxon label or '('"))?;
            if let Some(first) = self.seen_tips.insert(label.clone(), start) {
                return Err(DomainError::parse(
                    self.source_name,
                    start,
                    format!("duplicate tip label '{}' (first at byte {})", label, first),
                ));
            }
            let length = self.parse_length()?;
            Ok(self.tree.insert_node(NodeData { label: Some(label), length }, parent))
        }
    }

    fn parse_label(&mut self) -> Result<Option<String>, DomainError> {
        self.skip_insignificant()?;
        match self.peek() {
            Some('\'') => self.parse_quoted().map(Some),
            Some(c) if !DELIMITERS.contains(&c) => {
                let start = self.pos;
                while let Some(c) = self.peek() {
                    if c.is_whitespace() || DELIMITERS.contains(&c) {
                        break;
                    }
                    self.pos += c.len_utf8();
                }
                Ok(Some(self.input[start..self.pos].to_string()))
            }
            _ => Ok(None),
        }
    }

    fn parse_quoted(&mut self) -> Result<String, DomainError> {
        let start = self.pos;
        self.pos += 1;
        let mut label = String::new();
        loop {
            match self.peek() {
                Some('\'') => {
                    self.pos += 1;
                    if self.peek() == Some('\'') {
                        label.push('\'');
                        self.pos += 1;
                    } else {
                        return Ok(label);
                    }
                }
                Some(c) => {
                    label.push(c);
                    self.pos += c.len_utf8();
                }
                None => {
                    return Err(DomainError::parse(
                        self.source_name,
                        start,
                        "unterminated quoted label",
                    ))
                }
            }
        }
    }

    fn parse_length(&mut self) -> Result<Option<f64>, DomainError> {
        self.skip_insignificant()?;
        if self.peek() != Some(':') {
            return Ok(None);
        }
        self.pos += 1;
        self.skip_insignificant()?;
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E') {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = &self.input[start..self.pos];
        let value: f64 = text.parse().map_err(|_| {
            DomainError::parse(
                self.source_name,
                start,
                format!("invalid edge length '{}'", text),
            )
        })?;
        if !value.is_finite() || value < 0.0 {
            return Err(DomainError::parse(
                self.source_name,
                start,
                format!("edge length must be finite and non-negative, got {}", value),
            ));
        }
        Ok(Some(value))
    }

    /// Skip whitespace and `[...]` comments.
    fn skip_insignificant(&mut self) -> Result<(), DomainError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => self.pos += c.len_utf8(),
                Some('[') => {
                    let start = self.pos;
                    match self.input[self.pos..].find(']') {
                        Some(end) => self.pos += end + 1,
                        None => {
                            return Err(DomainError::parse(
                                self.source_name,
                                start,
                                "unterminated comment",
                            ))
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn error(&self, message: impl Into<String>) -> DomainError {
        DomainError::parse(self.source_name, self.pos, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn given_phylogram_when_parsing_then_builds_tips_and_lengths() {
        let tree = parse_newick("((Sp_A:0.1,Sp_B:0.2):0.05,Sp_C:0.3);", "test").unwrap();

        assert_eq!(tree.tip_labels(), vec!["Sp_A", "Sp_B", "Sp_C"]);
        let b = tree.find_tip("Sp_B").unwrap();
        assert_eq!(tree.length(b), Some(0.2));
        assert!((tree.distance_from_root(b) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn given_comments_and_whitespace_when_parsing_then_ignores_them() {
        let tree = parse_newick(
            "[&R] ( A : 1 ,\n  [note] B:2 ) root_label ;\n",
            "test",
        )
        .unwrap();

        assert_eq!(tree.tip_labels(), vec!["A", "B"]);
        let root = tree.root().unwrap();
        assert_eq!(tree.label(root), Some("root_label"));
    }

    #[test]
    fn given_quoted_label_when_round_tripping_then_label_survives() {
        let tree = parse_newick("('it''s here':1,B:2);", "test").unwrap();
        assert_eq!(tree.tip_labels(), vec!["it's here", "B"]);

        let written = write_newick(&tree);
        assert_eq!(written, "('it''s here':1,B:2);");
    }

    #[test]
    fn given_tree_when_writing_then_lengths_round_trip_exactly() {
        let input = "((A:0.123456789012345,B:1e-7):3.5,C:0);";
        let tree = parse_newick(input, "test").unwrap();
        let reparsed = parse_newick(&write_newick(&tree), "test").unwrap();

        for label in ["A", "B", "C"] {
            let a = tree.find_tip(label).unwrap();
            let b = reparsed.find_tip(label).unwrap();
            assert_eq!(tree.length(a), reparsed.length(b));
        }
        assert!(tree.same_topology(&reparsed));
    }

    #[rstest]
    #[case("", "empty input")]
    #[case("   ", "empty input")]
    #[case("((A,B),C)", "missing terminating")]
    #[case("((A,B),C", "unbalanced")]
    #[case("((A,B),C;", "expected ',' or ')'")]
    #[case("(A,B);(C,D);", "more than one tree")]
    #[case("(A:x,B);", "invalid edge length")]
    #[case("(A:-1,B);", "non-negative")]
    #[case("(A,A);", "duplicate tip label")]
    #[case("(A,'B);", "unterminated quoted")]
    #[case("(A,,B);", "expected a taxon label")]
    fn given_malformed_input_when_parsing_then_parse_error(
        #[case] input: &str,
        #[case] expected: &str,
    ) {
        let err = parse_newick(input, "bad.tree").unwrap_err();

        assert!(matches!(err, DomainError::Parse { .. }), "{:?}", err);
        let msg = err.to_string();
        assert!(msg.contains(expected), "'{}' should contain '{}'", msg, expected);
        assert!(msg.contains("bad.tree"));
    }
}
