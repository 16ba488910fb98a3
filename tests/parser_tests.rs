//! Parser and lexer integration tests: precedence, ranges, trivia
//! round-trips and error recovery

use fhirpath_engine::ast::{BinaryOperator, ExpressionNode};
use fhirpath_engine::parser::{
    Channel, ParseOptions, parse, parse_with_options, tokenize, tokenize_with_trivia,
};
use pretty_assertions::assert_eq;

fn top_operator(source: &str) -> BinaryOperator {
    match parse(source).unwrap().node {
        ExpressionNode::Binary(data) => data.op,
        other => panic!("expected binary expression for {source:?}, got {other:?}"),
    }
}

#[test]
fn trivia_preserving_tokenization_is_total() {
    let sources = [
        "name.given",
        "  1 +\t2 // trailing comment",
        "a /* inline */ and b\n.c",
        "name.where(use = 'official') . given [0]",
    ];
    for source in sources {
        let tokens = tokenize_with_trivia(source).unwrap();
        let joined: String = tokens.iter().map(|t| t.lexeme).collect();
        assert_eq!(joined, source, "round-trip failed for {source:?}");
        assert!(tokens.last().unwrap().is_eof());
    }
}

#[test]
fn default_tokenization_discards_trivia() {
    let tokens = tokenize("1 + 2 // comment").unwrap();
    assert!(tokens.iter().all(|t| t.channel == Channel::Default));
    // Number, Plus, Number, Eof
    assert_eq!(tokens.len(), 4);
}

#[test]
fn token_offsets_never_decrease() {
    let tokens = tokenize_with_trivia("a + b * (c - d)").unwrap();
    for pair in tokens.windows(2) {
        assert!(pair[0].position.offset <= pair[1].position.offset);
    }
}

#[test]
fn precedence_properties() {
    // a or (b and c)
    assert_eq!(top_operator("a or b and c"), BinaryOperator::Or);
    // ((a.b) = 1) and ((a.c) = 2)
    assert_eq!(top_operator("a.b = 1 and a.c = 2"), BinaryOperator::And);
    // 1 + (2 * 3)
    assert_eq!(top_operator("1 + 2 * 3"), BinaryOperator::Add);
    // comparison binds tighter than equality
    assert_eq!(top_operator("a = b < c"), BinaryOperator::Equal);
    // membership is looser than equality
    assert_eq!(top_operator("a = b in c"), BinaryOperator::In);
    // union binds tighter than comparison
    assert_eq!(top_operator("a | b < c"), BinaryOperator::LessThan);
}

#[test]
fn union_left_associates() {
    let expr = parse("a | b | c").unwrap();
    let ExpressionNode::Binary(outer) = &expr.node else {
        panic!("expected binary");
    };
    assert_eq!(outer.op, BinaryOperator::Union);
    let ExpressionNode::Binary(inner) = &outer.left.node else {
        panic!("expected left-nested union");
    };
    assert_eq!(inner.op, BinaryOperator::Union);
}

#[test]
fn ast_range_covers_the_whole_input() {
    for source in [
        "name.given",
        "iif(name.count() > 1, 'multi', 'single')",
        "{1, 2, 3}",
        "value as Quantity",
    ] {
        let expr = parse(source).unwrap();
        assert_eq!(expr.range.start.offset, 0, "start for {source:?}");
        assert_eq!(expr.range.end.offset, source.len(), "end for {source:?}");
    }
}

#[test]
fn child_ranges_stay_inside_parents() {
    let expr = parse("name.where(use = 'official').given").unwrap();
    let mut ok = true;
    expr.walk(&mut |node| {
        ok &= node.range.start.offset >= expr.range.start.offset
            && node.range.end.offset <= expr.range.end.offset;
    });
    assert!(ok);
}

#[test]
fn method_keywords_after_dot() {
    for source in ["a.contains('x')", "a.is(Integer)", "a.as(Quantity)", "a.div"] {
        assert!(parse(source).is_ok(), "failed to parse {source:?}");
    }
}

#[test]
fn fast_mode_reports_position() {
    let err = parse("1 + + ").unwrap_err();
    assert!(err.position().offset > 0);
    assert!(parse("where(").is_err());
    assert!(parse("a b c").is_err());
}

#[test]
fn recovery_mode_flags_errors_and_returns_a_tree() {
    let result = parse_with_options(
        "name.where(use = ) and active",
        ParseOptions {
            error_recovery: true,
            preserve_trivia: false,
        },
    );
    assert!(result.has_errors);
    assert!(!result.diagnostics.is_empty());
    for diagnostic in &result.diagnostics {
        assert_eq!(diagnostic.code.as_str(), "parse-error");
    }
    let mut error_nodes = 0;
    result.ast.walk(&mut |e| {
        if e.is_error() {
            error_nodes += 1;
        }
    });
    assert!(error_nodes > 0);
}

#[test]
fn recovery_mode_on_clean_input_matches_fast_mode() {
    let source = "name.given.first()";
    let fast = parse(source).unwrap();
    let recovered = parse_with_options(
        source,
        ParseOptions {
            error_recovery: true,
            preserve_trivia: false,
        },
    );
    assert!(!recovered.has_errors);
    assert!(recovered.diagnostics.is_empty());
    assert_eq!(format!("{fast}"), format!("{}", recovered.ast));
}

#[test]
fn quantity_literals() {
    let expr = parse("4 days + 2 weeks").unwrap();
    let ExpressionNode::Binary(data) = &expr.node else {
        panic!("expected binary");
    };
    assert!(matches!(data.left.node, ExpressionNode::Literal(_)));
    assert!(matches!(data.right.node, ExpressionNode::Literal(_)));

    let ucum = parse("5 'mg'").unwrap();
    assert!(matches!(ucum.node, ExpressionNode::Literal(_)));
}

#[test]
fn environment_variable_forms() {
    for source in ["%context", "%`vs-name`", "%'quoted name'"] {
        let expr = parse(source).unwrap();
        assert!(
            matches!(expr.node, ExpressionNode::Variable(_)),
            "for {source:?}"
        );
    }
}
