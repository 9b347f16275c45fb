//! Calibration table construction through the public domain API.

use rstest::rstest;

use timetree::domain::{
    parse_newick, Anchor, CalibrationSpec, CalibrationTable, DomainError, NodeId, ValidationError,
};

const TREE: &str = "(Sp_0:0.3,((Sp_A:0.05,Sp_B:0.06):0.1,(Sp_C:0.04,Sp_D:0.03):0.12):0.2);";

fn taxa(names: &[&str]) -> Anchor {
    Anchor::Mrca(names.iter().map(|s| s.to_string()).collect())
}

#[rstest]
#[case(vec![100.0], vec![160.0, 13.3], vec![false, false], "min_age")]
#[case(vec![100.0, 6.3], vec![160.0], vec![false, false], "max_age")]
#[case(vec![100.0, 6.3], vec![160.0, 13.3], vec![false], "soft")]
fn given_mismatched_columns_when_building_then_validation_error_names_column(
    #[case] min: Vec<f64>,
    #[case] max: Vec<f64>,
    #[case] soft: Vec<bool>,
    #[case] column: &str,
) {
    let tree = parse_newick(TREE, "t").unwrap();
    let nodes = [NodeId(6), NodeId(8)];

    let err = CalibrationTable::from_columns(&tree, &nodes, &min, &max, &soft).unwrap_err();

    match err {
        DomainError::Validation(ValidationError::LengthMismatch { column: c, .. }) => {
            assert_eq!(c, column)
        }
        other => panic!("expected length mismatch, got {:?}", other),
    }
}

#[test]
fn given_specs_when_building_then_order_is_kept_and_nodes_resolve() {
    let tree = parse_newick(TREE, "t").unwrap();
    let specs = vec![
        CalibrationSpec::hard(taxa(&["Sp_C", "Sp_D"]), 4.25, 8.87),
        CalibrationSpec::hard(Anchor::Root, 100.0, 160.0),
        CalibrationSpec::soft(taxa(&["Sp_A", "Sp_B"]), 6.3, 13.3),
    ];

    let table = CalibrationTable::build(&tree, &specs).unwrap();

    let nodes: Vec<NodeId> = table.iter().map(|r| r.node).collect();
    assert_eq!(nodes, vec![NodeId(9), NodeId(6), NodeId(8)]);
    assert!(table.records()[2].soft);
    assert_eq!(table.describe().len(), 3);
}

#[test]
fn given_two_anchors_on_same_node_when_building_then_duplicate_is_reported() {
    let tree = parse_newick(TREE, "t").unwrap();
    let specs = vec![
        CalibrationSpec::hard(taxa(&["Sp_A", "Sp_B"]), 6.3, 13.3),
        CalibrationSpec::hard(taxa(&["Sp_B", "Sp_A"]), 7.0, 9.0),
    ];

    let err = CalibrationTable::build(&tree, &specs).unwrap_err();

    assert!(matches!(
        err,
        DomainError::Validation(ValidationError::DuplicateNode {
            position: 2,
            first: 1,
            ..
        })
    ));
}

#[test]
fn given_single_taxon_anchor_when_building_then_taxon_set_error() {
    let tree = parse_newick(TREE, "t").unwrap();
    let specs = vec![CalibrationSpec::hard(taxa(&["Sp_A"]), 1.0, 2.0)];

    let err = CalibrationTable::build(&tree, &specs).unwrap_err();

    assert!(matches!(err, DomainError::InvalidTaxonSet { .. }));
}
