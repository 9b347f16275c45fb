//! Nexus TAXA/TREES block reader and writer.
//!
//! Only the parts needed to carry one rooted tree are handled: `TAXLABELS`,
//! `TRANSLATE` and the first `TREE` statement. Other blocks are skipped.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::domain::arena::PhyloTree;
use crate::domain::error::DomainError;
use crate::domain::newick::{parse_newick, quote_label, write_newick_with};

/// True if the text starts with the `#NEXUS` marker (case-insensitive).
pub fn is_nexus(input: &str) -> bool {
    input
        .trim_start()
        .get(..6)
        .map(|head| head.eq_ignore_ascii_case("#nexus"))
        .unwrap_or(false)
}

/// Serialize a tree as a Nexus file with a TAXA block and a translated TREES block.
///
/// Tips are numbered in left-to-right order, matching their node numbers.
pub fn write_nexus(tree: &PhyloTree, tree_name: &str, header: Option<&str>) -> String {
    let labels = tree.tip_labels();
    let numbers: HashMap<&str, usize> = labels
        .iter()
        .enumerate()
        .map(|(i, l)| (l.as_str(), i + 1))
        .collect();

    let mut out = String::from("#NEXUS\n");
    if let Some(header) = header {
        out.push_str(&format!("[{}]\n", header.replace(['[', ']'], "")));
    }
    out.push_str("\nBEGIN TAXA;\n");
    out.push_str(&format!("\tDIMENSIONS NTAX = {};\n", labels.len()));
    out.push_str("\tTAXLABELS\n");
    for label in &labels {
        out.push_str(&format!("\t\t{}\n", quote_label(label)));
    }
    out.push_str("\t;\nEND;\n");

    out.push_str("BEGIN TREES;\n\tTRANSLATE\n");
    for (i, label) in labels.iter().enumerate() {
        let sep = if i + 1 < labels.len() { "," } else { "" };
        out.push_str(&format!("\t\t{}\t{}{}\n", i + 1, quote_label(label), sep));
    }
    out.push_str("\t;\n");

    let body = write_newick_with(tree, |label| {
        numbers
            .get(label)
            .map(|n| n.to_string())
            .unwrap_or_else(|| quote_label(label))
    });
    out.push_str(&format!(
        "\tTREE * {} = [&R] {}\n",
        quote_label(tree_name),
        body
    ));
    out.push_str("END;\n");
    out
}

fn tree_statement_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)^\s*tree\s+\*?\s*(.+?)\s*=\s*(.*)$").ok())
        .as_ref()
}

/// Parse the first tree of the TREES block, applying the TRANSLATE table.
pub fn parse_nexus(input: &str, source_name: &str) -> Result<PhyloTree, DomainError> {
    if !is_nexus(input) {
        return Err(DomainError::parse(source_name, 0, "missing #NEXUS header"));
    }

    let mut in_trees = false;
    let mut translate: HashMap<String, String> = HashMap::new();

    for (offset, raw) in split_statements(input) {
        let stripped = strip_comments(raw);
        let mut statement = stripped.trim();
        if is_nexus(statement) {
            statement = statement[6..].trim_start();
        }
        let keyword = statement
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();

        match keyword.as_str() {
            "begin" => {
                let block = statement
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or("")
                    .to_ascii_lowercase();
                in_trees = block == "trees";
            }
            "end" | "endblock" => in_trees = false,
            "translate" if in_trees => {
                translate = parse_translate(&statement["translate".len()..]);
            }
            "tree" if in_trees => {
                let caps = tree_statement_regex()
                    .and_then(|re| re.captures(statement))
                    .ok_or_else(|| {
                    DomainError::parse(source_name, offset, "malformed TREE statement")
                })?;
                let body = format!("{};", &caps[2]);
                let mut tree = parse_newick(&body, &format!("{} (TREE statement)", source_name))?;
                apply_translation(&mut tree, &translate);
                return Ok(tree);
            }
            _ => {}
        }
    }

    Err(DomainError::parse(
        source_name,
        input.len(),
        "no TREE statement in a TREES block",
    ))
}

fn apply_translation(tree: &mut PhyloTree, translate: &HashMap<String, String>) {
    if translate.is_empty() {
        return;
    }
    for idx in tree.tips() {
        if let Some(node) = tree.get_node_mut(idx) {
            if let Some(label) = node.data.label.as_ref().and_then(|l| translate.get(l)) {
                node.data.label = Some(label.clone());
            }
        }
    }
}

fn parse_translate(body: &str) -> HashMap<String, String> {
    split_outside_quotes(body, ',')
        .into_iter()
        .filter_map(|entry| {
            let entry = entry.trim();
            let (key, label) = entry.split_once(char::is_whitespace)?;
            Some((key.to_string(), unquote(label.trim())))
        })
        .collect()
}

fn unquote(label: &str) -> String {
    if label.len() >= 2 && label.starts_with('\'') && label.ends_with('\'') {
        label[1..label.len() - 1].replace("''", "'")
    } else {
        label.to_string()
    }
}

/// Split at `;` outside quotes and comments, returning each statement with its byte offset.
fn split_statements(input: &str) -> Vec<(usize, &str)> {
    let mut statements = Vec::new();
    let mut start = 0;
    let mut in_quote = false;
    let mut in_comment = false;
    for (i, c) in input.char_indices() {
        match c {
            '\'' if !in_comment => in_quote = !in_quote,
            '[' if !in_quote => in_comment = true,
            ']' if !in_quote => in_comment = false,
            ';' if !in_quote && !in_comment => {
                statements.push((start, &input[start..i]));
                start = i + 1;
            }
            _ => {}
        }
    }
    statements
}

fn split_outside_quotes(input: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quote = false;
    for (i, c) in input.char_indices() {
        if c == '\'' {
            in_quote = !in_quote;
        } else if c == sep && !in_quote {
            parts.push(&input[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&input[start..]);
    parts
}

fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_quote = false;
    let mut depth = 0usize;
    for c in input.chars() {
        match c {
            '\'' if depth == 0 => {
                in_quote = !in_quote;
                out.push(c);
            }
            '[' if !in_quote => depth += 1,
            ']' if !in_quote && depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "#NEXUS\n\
[written by hand]\n\
BEGIN TAXA;\n\
\tDIMENSIONS NTAX = 3;\n\
\tTAXLABELS Sp_A 'Sp B' Sp_C;\n\
END;\n\
BEGIN TREES;\n\
\tTRANSLATE\n\
\t\t1 Sp_A,\n\
\t\t2 'Sp B',\n\
\t\t3 Sp_C\n\
\t;\n\
\tTREE tree_1 = [&R] ((1:1.5,2:1.5):2,3:3.5);\n\
\tTREE tree_2 = ((1,3),2);\n\
END;\n";

    #[test]
    fn given_translated_trees_block_when_parsing_then_restores_labels() {
        let tree = parse_nexus(SAMPLE, "sample.nex").unwrap();

        assert_eq!(tree.tip_labels(), vec!["Sp_A", "Sp B", "Sp_C"]);
        let c = tree.find_tip("Sp_C").unwrap();
        assert_eq!(tree.length(c), Some(3.5));
    }

    #[test]
    fn given_tree_when_writing_nexus_then_reads_back_identically() {
        let tree = parse_newick("((Sp_A:1.25,Sp_B:1.25):3,'odd name':4.25);", "test").unwrap();

        let text = write_nexus(&tree, "timetree", Some("generated"));
        assert!(text.starts_with("#NEXUS\n[generated]\n"));
        assert!(text.contains("DIMENSIONS NTAX = 3;"));
        assert!(text.contains("\t\t3\t'odd name'\n"));
        assert!(text.contains("TREE * timetree = [&R] ((1:1.25,2:1.25):3,3:4.25);"));

        let back = parse_nexus(&text, "roundtrip.nex").unwrap();
        assert!(tree.same_topology(&back));
        assert_eq!(back.tip_labels(), tree.tip_labels());
        for label in tree.tip_labels() {
            let a = tree.find_tip(&label).unwrap();
            let b = back.find_tip(&label).unwrap();
            assert_eq!(tree.length(a), back.length(b));
        }
    }

    #[test]
    fn given_nexus_without_trees_when_parsing_then_parse_error() {
        let err = parse_nexus("#NEXUS\nBEGIN TAXA;\nEND;\n", "empty.nex").unwrap_err();
        assert!(err.to_string().contains("no TREE statement"));
    }

    #[test]
    fn given_newick_text_when_checking_header_then_not_nexus() {
        assert!(is_nexus("  #nexus\n"));
        assert!(!is_nexus("(A,B);"));
        assert!(!is_nexus("#NEX"));
    }
}
