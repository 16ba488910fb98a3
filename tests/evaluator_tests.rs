//! End-to-end evaluation scenarios over a FHIR Patient resource

use fhirpath_engine::{Collection, FhirPathEngine, FhirPathValue, evaluate};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

fn patient() -> Value {
    json!({
        "resourceType": "Patient",
        "active": true,
        "name": [
            {"use": "official", "family": "Smith", "given": ["Sarah", "Jane"]},
            {"use": "nickname", "given": ["SJ"]}
        ],
        "birthDate": "1985-08-15"
    })
}

fn strings(collection: &Collection) -> Vec<String> {
    collection
        .iter()
        .map(|v| v.as_string().expect("string value").to_string())
        .collect()
}

#[test]
fn navigation_flattens_repeating_elements() {
    let out = evaluate("name.given", &patient()).unwrap();
    assert_eq!(strings(&out), vec!["Sarah", "Jane", "SJ"]);
}

#[test]
fn where_filters_in_input_order() {
    let out = evaluate("name.where(use = 'official').given", &patient()).unwrap();
    assert_eq!(strings(&out), vec!["Sarah", "Jane"]);
}

#[test]
fn union_preserves_order_and_deduplicates() {
    let out = evaluate("name.family | name.given", &patient()).unwrap();
    assert_eq!(strings(&out), vec!["Smith", "Sarah", "Jane", "SJ"]);

    // Self-union collapses duplicates; combine keeps them
    let unioned = evaluate("name.given | name.given", &patient()).unwrap();
    assert_eq!(unioned.len(), 3);
    let combined = evaluate("name.given.combine(name.given)", &patient()).unwrap();
    assert_eq!(combined.len(), 6);
}

#[test]
fn iif_selects_single_branch() {
    let out = evaluate("iif(name.count() > 1, 'multi', 'single')", &patient()).unwrap();
    assert_eq!(strings(&out), vec!["multi"]);

    // The unselected branch is never evaluated, so its errors don't surface
    let safe = evaluate("iif(true, 'ok', 1 'mg' + 1 'kg')", &patient()).unwrap();
    assert_eq!(strings(&safe), vec!["ok"]);
}

#[test]
fn define_variable_flows_down_the_dot_chain() {
    let out = evaluate(
        "defineVariable('first', name.first().given.first()).name.given.select(%first)",
        &patient(),
    )
    .unwrap();
    assert_eq!(strings(&out), vec!["Sarah", "Sarah", "Sarah"]);
}

#[test]
fn define_variable_does_not_leak_across_union_branches() {
    // The right branch of `|` never sees the left branch's binding
    let out = evaluate("defineVariable('v', 'x').select(%v) | %v", &patient()).unwrap();
    assert_eq!(strings(&out), vec!["x"]);
}

#[test]
fn arithmetic_scenarios() {
    let input = json!(null);
    assert_eq!(
        evaluate("1 + 2 * 3", &input).unwrap().first().unwrap().as_integer(),
        Some(7)
    );
    assert_eq!(
        evaluate("(1 + 2) * 3", &input).unwrap().first().unwrap().as_integer(),
        Some(9)
    );
    assert!(evaluate("1 / 0", &input).unwrap().is_empty());
}

#[test]
fn logic_scenarios() {
    let input = json!(null);
    assert!(evaluate("true and {}", &input).unwrap().is_empty());
    assert_eq!(
        evaluate("true or {}", &input).unwrap().first().unwrap().as_boolean(),
        Some(true)
    );
}

#[test]
fn out_of_bounds_indexing_degrades_to_empty() {
    assert!(evaluate("name[5].given", &patient()).unwrap().is_empty());
    assert_eq!(
        strings(&evaluate("name[0].given", &patient()).unwrap()),
        vec!["Sarah", "Jane"]
    );
}

#[test]
fn empty_propagation_through_navigation() {
    assert!(evaluate("maritalStatus.coding.code", &patient()).unwrap().is_empty());
    assert!(evaluate("name.period.start", &patient()).unwrap().is_empty());
}

#[test]
fn existence_and_counting() {
    let p = patient();
    assert_eq!(
        evaluate("name.exists()", &p).unwrap().first().unwrap().as_boolean(),
        Some(true)
    );
    assert_eq!(
        evaluate("name.exists(use = 'official')", &p).unwrap().first().unwrap().as_boolean(),
        Some(true)
    );
    assert_eq!(
        evaluate("name.empty()", &p).unwrap().first().unwrap().as_boolean(),
        Some(false)
    );
    assert_eq!(
        evaluate("name.given.count()", &p).unwrap().first().unwrap().as_integer(),
        Some(3)
    );
    assert_eq!(
        evaluate("name.all(given.exists())", &p).unwrap().first().unwrap().as_boolean(),
        Some(true)
    );
}

#[test]
fn subsetting_functions() {
    let p = patient();
    assert_eq!(
        strings(&evaluate("name.given.first()", &p).unwrap()),
        vec!["Sarah"]
    );
    assert_eq!(
        strings(&evaluate("name.given.last()", &p).unwrap()),
        vec!["SJ"]
    );
    assert_eq!(
        strings(&evaluate("name.given.tail()", &p).unwrap()),
        vec!["Jane", "SJ"]
    );
    assert_eq!(
        strings(&evaluate("name.given.skip(1).take(1)", &p).unwrap()),
        vec!["Jane"]
    );
    assert!(evaluate("name.given.single()", &p).is_err());
}

#[test]
fn type_filter_and_resource_identifier() {
    let p = patient();
    assert_eq!(
        evaluate("Patient.active", &p).unwrap().first().unwrap().as_boolean(),
        Some(true)
    );
    assert!(evaluate("Observation.status", &p).unwrap().is_empty());
}

#[test]
fn string_functions_end_to_end() {
    let p = patient();
    assert_eq!(
        strings(&evaluate("name.family.upper()", &p).unwrap()),
        vec!["SMITH"]
    );
    assert_eq!(
        evaluate("name.family.length()", &p).unwrap().first().unwrap().as_integer(),
        Some(5)
    );
    assert_eq!(
        evaluate("name.family.startsWith('Sm')", &p).unwrap().first().unwrap().as_boolean(),
        Some(true)
    );
    assert_eq!(
        strings(&evaluate("name.given.join(', ')", &p).unwrap()),
        vec!["Sarah, Jane, SJ"]
    );
    assert_eq!(
        evaluate("name.family.matches('^S.*h$')", &p).unwrap().first().unwrap().as_boolean(),
        Some(true)
    );
}

#[test]
fn temporal_comparison_against_json_string() {
    let p = patient();
    assert_eq!(
        evaluate("birthDate = @1985-08-15", &p).unwrap().first().unwrap().as_boolean(),
        Some(true)
    );
    assert_eq!(
        evaluate("birthDate < @1990-01-01", &p).unwrap().first().unwrap().as_boolean(),
        Some(true)
    );
}

#[test]
fn date_arithmetic_with_calendar_quantities() {
    let input = json!(null);
    let out = evaluate("@2023-01-31 + 1 month", &input).unwrap();
    assert_eq!(out.first().unwrap().to_string(), "2023-02-28");
    let weeks = evaluate("@2023-01-01 + 2 weeks", &input).unwrap();
    assert_eq!(weeks.first().unwrap().to_string(), "2023-01-15");
}

#[test]
fn aggregate_folds_with_total() {
    let input = json!({"value": [1, 2, 3, 4]});
    let out = evaluate("value.aggregate($this + $total, 0)", &input).unwrap();
    assert_eq!(out.first().unwrap().as_integer(), Some(10));
}

#[test]
fn repeat_reaches_transitive_closure() {
    let input = json!({
        "item": [
            {"linkId": "1", "item": [{"linkId": "1.1", "item": [{"linkId": "1.1.1"}]}]},
            {"linkId": "2"}
        ]
    });
    let out = evaluate("repeat(item).linkId", &input).unwrap();
    let mut ids = strings(&out);
    ids.sort();
    assert_eq!(ids, vec!["1", "1.1", "1.1.1", "2"]);
}

#[test]
fn children_and_descendants() {
    let p = patient();
    // active, two names, birthDate (resourceType excluded)
    assert_eq!(evaluate("children()", &p).unwrap().len(), 4);
    let descendants = evaluate("descendants()", &p).unwrap();
    assert!(descendants.len() > 4);
}

#[test]
fn conversions_round_through_values() {
    let input = json!(null);
    assert_eq!(
        evaluate("'42'.toInteger()", &input).unwrap().first().unwrap().as_integer(),
        Some(42)
    );
    assert!(evaluate("'x'.toInteger()", &input).unwrap().is_empty());
    assert_eq!(
        evaluate("'42'.convertsToInteger()", &input).unwrap().first().unwrap().as_boolean(),
        Some(true)
    );
    assert_eq!(
        strings(&evaluate("(1.5).toString()", &input).unwrap()),
        vec!["1.5"]
    );
    assert_eq!(
        evaluate("1 'mg'.toQuantity()", &input).unwrap().len(),
        1
    );
}

#[test]
fn type_operations() {
    let p = patient();
    assert_eq!(
        evaluate("birthDate is String", &p).unwrap().first().unwrap().as_boolean(),
        Some(true)
    );
    assert_eq!(
        evaluate("name.given.ofType(String).count()", &p).unwrap().first().unwrap().as_integer(),
        Some(3)
    );
    assert_eq!(
        strings(&evaluate("active.type().name", &p).unwrap()),
        vec!["Boolean"]
    );
}

#[test]
fn evaluation_is_pure_for_deterministic_expressions() {
    let engine = FhirPathEngine::new();
    let expr = engine.parse("name.where(use = 'official').given.count()").unwrap();
    let input = Collection::from_json(&patient());
    let a = engine.evaluate_expression(&expr, input.share()).unwrap();
    let b = engine.evaluate_expression(&expr, input).unwrap();
    assert_eq!(a, b);
}

#[test]
fn today_is_impure_but_chains_into_comparisons() {
    let p = patient();
    assert_eq!(
        evaluate("birthDate < today()", &p).unwrap().first().unwrap().as_boolean(),
        Some(true)
    );
}

#[test]
fn multiple_items_where_singleton_expected_is_an_error() {
    let p = patient();
    assert!(evaluate("name.given + 'x'", &p).is_err());
    assert!(evaluate("name.given.upper()", &p).is_err());
}

#[test]
fn environment_variables_are_bound_at_entry() {
    let p = patient();
    assert_eq!(
        evaluate("%resource.name.given.count()", &p).unwrap().first().unwrap().as_integer(),
        Some(3)
    );
    assert_eq!(
        evaluate("%context = %rootResource", &p).unwrap().first().unwrap().as_boolean(),
        Some(true)
    );
}

#[test]
fn scalar_input_is_wrapped_into_a_singleton() {
    let out = evaluate("$this + 1", &json!(41)).unwrap();
    assert_eq!(out.first().unwrap().as_integer(), Some(42));
}

#[test]
fn membership_operators() {
    let p = patient();
    assert_eq!(
        evaluate("'Sarah' in name.given", &p).unwrap().first().unwrap().as_boolean(),
        Some(true)
    );
    assert_eq!(
        evaluate("name.given contains 'SJ'", &p).unwrap().first().unwrap().as_boolean(),
        Some(true)
    );
}

#[test]
fn string_concatenation_with_empty_operand() {
    let p = patient();
    assert_eq!(
        strings(&evaluate("name.family.first() & ', ' & suffix", &p).unwrap()),
        vec!["Smith, "]
    );
}
