//! Three-valued logic truth tables and singleton coercion
//!
//! Covers all 27 operand combinations of {true, false, {}} for the four
//! binary logical operators, plus not() and the boolean coercion rules.

use fhirpath_engine::evaluate;
use rstest::rstest;
use serde_json::json;

/// Evaluate a boolean expression to Some(bool) or None for empty
fn tri(expression: &str) -> Option<bool> {
    let out = evaluate(expression, &json!(null)).unwrap();
    assert!(out.len() <= 1, "logic result must be empty or singleton");
    out.first().and_then(|v| v.as_boolean())
}

const OPERANDS: [&str; 3] = ["true", "false", "{}"];

fn lookup(table: &[[Option<bool>; 3]; 3], a: usize, b: usize) -> Option<bool> {
    table[a][b]
}

#[rstest]
fn and_truth_table() {
    let expected = [
        // true and {true, false, {}}
        [Some(true), Some(false), None],
        // false and ...
        [Some(false), Some(false), Some(false)],
        // {} and ...
        [None, Some(false), None],
    ];
    for (a, left) in OPERANDS.iter().enumerate() {
        for (b, right) in OPERANDS.iter().enumerate() {
            assert_eq!(
                tri(&format!("{left} and {right}")),
                lookup(&expected, a, b),
                "{left} and {right}"
            );
        }
    }
}

#[rstest]
fn or_truth_table() {
    let expected = [
        [Some(true), Some(true), Some(true)],
        [Some(true), Some(false), None],
        [Some(true), None, None],
    ];
    for (a, left) in OPERANDS.iter().enumerate() {
        for (b, right) in OPERANDS.iter().enumerate() {
            assert_eq!(
                tri(&format!("{left} or {right}")),
                lookup(&expected, a, b),
                "{left} or {right}"
            );
        }
    }
}

#[rstest]
fn xor_truth_table() {
    let expected = [
        [Some(false), Some(true), None],
        [Some(true), Some(false), None],
        [None, None, None],
    ];
    for (a, left) in OPERANDS.iter().enumerate() {
        for (b, right) in OPERANDS.iter().enumerate() {
            assert_eq!(
                tri(&format!("{left} xor {right}")),
                lookup(&expected, a, b),
                "{left} xor {right}"
            );
        }
    }
}

#[rstest]
fn implies_truth_table() {
    let expected = [
        [Some(true), Some(false), None],
        [Some(true), Some(true), Some(true)],
        [Some(true), None, None],
    ];
    for (a, left) in OPERANDS.iter().enumerate() {
        for (b, right) in OPERANDS.iter().enumerate() {
            assert_eq!(
                tri(&format!("{left} implies {right}")),
                lookup(&expected, a, b),
                "{left} implies {right}"
            );
        }
    }
}

#[rstest]
#[case("true.not()", Some(false))]
#[case("false.not()", Some(true))]
#[case("{}.not()", None)]
fn not_function(#[case] expression: &str, #[case] expected: Option<bool>) {
    assert_eq!(tri(expression), expected);
}

#[test]
fn existence_coercion_applies_to_single_non_booleans() {
    // A single non-boolean element coerces to true
    assert_eq!(tri("'x' and true"), Some(true));
    assert_eq!(tri("1 or false"), Some(true));
    assert_eq!(tri("'x'.not()"), Some(false));
}

#[test]
fn multiple_elements_fail_boolean_coercion() {
    assert!(evaluate("(1 | 2) and true", &json!(null)).is_err());
}

#[test]
fn comparisons_feed_three_valued_logic() {
    assert_eq!(tri("1 < 2 and 2 < 3"), Some(true));
    // The empty comparison poisons the conjunction
    assert_eq!(tri("1 < 2 and ({} < 3)"), None);
}
