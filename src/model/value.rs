//! Core value types for FHIRPath evaluation
//!
//! Every value-carrying step of evaluation produces a [`Collection`];
//! singletons are collections of length one and the empty collection is the
//! canonical "no value". [`FhirPathValue`] is the element type: primitives,
//! quantities, composite resources (JSON-backed) and type-info objects.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::quantity::Quantity;

/// A single FHIRPath value
#[derive(Debug, Clone)]
pub enum FhirPathValue {
    /// Boolean value
    Boolean(bool),
    /// 64-bit integer
    Integer(i64),
    /// Arbitrary-precision decimal
    Decimal(Decimal),
    /// String value
    String(String),
    /// Date without time
    Date(NaiveDate),
    /// Date-time with fixed offset
    DateTime(DateTime<FixedOffset>),
    /// Time of day
    Time(NaiveTime),
    /// Quantity with optional unit
    Quantity(Quantity),
    /// Composite value backed by FHIR JSON (object)
    Resource(Arc<JsonValue>),
    /// Result of the `type()` function
    TypeInfoObject {
        /// Type namespace (`System` or `FHIR`)
        namespace: String,
        /// Type name
        name: String,
    },
}

impl FhirPathValue {
    /// Convert a JSON value into a single FHIRPath value.
    ///
    /// Arrays are not values; callers flatten them into collections.
    pub fn from_json(json: &JsonValue) -> Option<FhirPathValue> {
        match json {
            JsonValue::Null => None,
            JsonValue::Bool(b) => Some(FhirPathValue::Boolean(*b)),
            JsonValue::Number(n) => Some(match n.as_i64() {
                Some(i) => FhirPathValue::Integer(i),
                None => FhirPathValue::Decimal(
                    Decimal::from_str(&n.to_string())
                        .or_else(|_| Decimal::try_from(n.as_f64().unwrap_or(0.0)))
                        .unwrap_or_default(),
                ),
            }),
            JsonValue::String(s) => Some(FhirPathValue::String(s.clone())),
            JsonValue::Object(_) => Some(FhirPathValue::Resource(Arc::new(json.clone()))),
            JsonValue::Array(_) => Some(FhirPathValue::Resource(Arc::new(json.clone()))),
        }
    }

    /// Render back to JSON
    pub fn to_json(&self) -> JsonValue {
        match self {
            FhirPathValue::Boolean(b) => JsonValue::Bool(*b),
            FhirPathValue::Integer(i) => JsonValue::from(*i),
            FhirPathValue::Decimal(d) => d
                .to_f64()
                .and_then(|f| serde_json::Number::from_f64(f).map(JsonValue::Number))
                .unwrap_or_else(|| JsonValue::String(d.to_string())),
            FhirPathValue::String(s) => JsonValue::String(s.clone()),
            FhirPathValue::Date(d) => JsonValue::String(d.format("%Y-%m-%d").to_string()),
            FhirPathValue::DateTime(dt) => JsonValue::String(dt.to_rfc3339()),
            FhirPathValue::Time(t) => JsonValue::String(t.format("%H:%M:%S").to_string()),
            FhirPathValue::Quantity(q) => {
                let mut obj = serde_json::Map::new();
                obj.insert("value".to_string(), JsonValue::String(q.value.to_string()));
                if let Some(unit) = &q.unit {
                    obj.insert("unit".to_string(), JsonValue::String(unit.clone()));
                }
                JsonValue::Object(obj)
            }
            FhirPathValue::Resource(json) => (**json).clone(),
            FhirPathValue::TypeInfoObject { namespace, name } => {
                JsonValue::String(format!("{namespace}.{name}"))
            }
        }
    }

    /// System type name of this value
    pub fn type_name(&self) -> &str {
        match self {
            FhirPathValue::Boolean(_) => "Boolean",
            FhirPathValue::Integer(_) => "Integer",
            FhirPathValue::Decimal(_) => "Decimal",
            FhirPathValue::String(_) => "String",
            FhirPathValue::Date(_) => "Date",
            FhirPathValue::DateTime(_) => "DateTime",
            FhirPathValue::Time(_) => "Time",
            FhirPathValue::Quantity(_) => "Quantity",
            FhirPathValue::TypeInfoObject { .. } => "TypeInfo",
            FhirPathValue::Resource(json) => json
                .get("resourceType")
                .and_then(JsonValue::as_str)
                .unwrap_or("Object"),
        }
    }

    /// The boolean payload, when this is a Boolean
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            FhirPathValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer payload, when this is an Integer
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FhirPathValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// The string payload, when this is a String
    pub fn as_string(&self) -> Option<&str> {
        match self {
            FhirPathValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view: integers widen to decimal
    pub fn as_numeric(&self) -> Option<Decimal> {
        match self {
            FhirPathValue::Integer(i) => Some(Decimal::from(*i)),
            FhirPathValue::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// The underlying JSON for composite values
    pub fn as_resource(&self) -> Option<&JsonValue> {
        match self {
            FhirPathValue::Resource(json) => Some(json),
            _ => None,
        }
    }

    /// Read a named property of a composite value
    pub fn property(&self, name: &str) -> Option<&JsonValue> {
        self.as_resource().and_then(|json| json.get(name))
    }

    /// Immediate child nodes of a composite value, in document order
    pub fn children(&self) -> Vec<FhirPathValue> {
        let mut out = Vec::new();
        if let Some(JsonValue::Object(map)) = self.as_resource() {
            for (key, value) in map {
                if key == "resourceType" {
                    continue;
                }
                append_json(&mut out, value);
            }
        }
        out
    }
}

/// Append a JSON value to a collection buffer, flattening arrays one level
pub(crate) fn append_json(out: &mut Vec<FhirPathValue>, json: &JsonValue) {
    match json {
        JsonValue::Array(items) => {
            for item in items {
                if let Some(v) = FhirPathValue::from_json(item) {
                    out.push(v);
                }
            }
        }
        other => {
            if let Some(v) = FhirPathValue::from_json(other) {
                out.push(v);
            }
        }
    }
}

/// FHIRPath value equality (`=` semantics for single elements).
///
/// Integers compare numerically against decimals; strings compare against
/// temporal values by parsing, which is how untyped FHIR JSON primitives
/// meet temporal literals.
pub fn values_equal(a: &FhirPathValue, b: &FhirPathValue) -> bool {
    use FhirPathValue::*;
    match (a, b) {
        (Boolean(x), Boolean(y)) => x == y,
        (Integer(x), Integer(y)) => x == y,
        (String(x), String(y)) => x == y,
        (Decimal(_) | Integer(_), Decimal(_) | Integer(_)) => {
            a.as_numeric() == b.as_numeric()
        }
        (Date(x), Date(y)) => x == y,
        (DateTime(x), DateTime(y)) => x == y,
        (Time(x), Time(y)) => x == y,
        (Quantity(x), Quantity(y)) => x.same_unit(y) && x.value == y.value,
        (String(s), Date(d)) | (Date(d), String(s)) => parse_date(s) == Some(*d),
        (String(s), DateTime(dt)) | (DateTime(dt), String(s)) => {
            parse_datetime(s).is_some_and(|p| p == *dt)
        }
        (String(s), Time(t)) | (Time(t), String(s)) => parse_time(s) == Some(*t),
        (Resource(x), Resource(y)) => x == y,
        (
            TypeInfoObject {
                namespace: xn,
                name: xm,
            },
            TypeInfoObject {
                namespace: yn,
                name: ym,
            },
        ) => xn == yn && xm == ym,
        _ => false,
    }
}

/// FHIRPath equivalence (`~` semantics for single elements)
pub fn values_equivalent(a: &FhirPathValue, b: &FhirPathValue) -> bool {
    use FhirPathValue::*;
    match (a, b) {
        (String(x), String(y)) => normalize_for_equivalence(x) == normalize_for_equivalence(y),
        _ => values_equal(a, b),
    }
}

fn normalize_for_equivalence(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl PartialEq for FhirPathValue {
    fn eq(&self, other: &Self) -> bool {
        values_equal(self, other)
    }
}

impl fmt::Display for FhirPathValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FhirPathValue::Boolean(b) => write!(f, "{b}"),
            FhirPathValue::Integer(i) => write!(f, "{i}"),
            FhirPathValue::Decimal(d) => write!(f, "{d}"),
            FhirPathValue::String(s) => f.write_str(s),
            FhirPathValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            FhirPathValue::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            FhirPathValue::Time(t) => write!(f, "{}", t.format("%H:%M:%S")),
            FhirPathValue::Quantity(q) => write!(f, "{q}"),
            FhirPathValue::Resource(json) => write!(f, "{json}"),
            FhirPathValue::TypeInfoObject { namespace, name } => {
                write!(f, "{namespace}.{name}")
            }
        }
    }
}

/// An ordered collection of values; the unit of data flow in evaluation.
///
/// Backed by an `Arc` slice so sharing between contexts is cheap.
#[derive(Debug, Clone, Default)]
pub struct Collection(Arc<[FhirPathValue]>);

impl Collection {
    /// The empty collection
    pub fn empty() -> Self {
        Self(Arc::from([]))
    }

    /// Collection holding exactly one value
    pub fn singleton(value: FhirPathValue) -> Self {
        Self(Arc::from([value]))
    }

    /// Build from a vector
    pub fn from_vec(values: Vec<FhirPathValue>) -> Self {
        Self(values.into())
    }

    /// Convert a whole JSON document into a collection: arrays become their
    /// elements, `null` becomes empty, anything else a singleton
    pub fn from_json(json: &JsonValue) -> Self {
        let mut out = Vec::new();
        append_json(&mut out, json);
        Self::from_vec(out)
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no elements
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over elements
    pub fn iter(&self) -> std::slice::Iter<'_, FhirPathValue> {
        self.0.iter()
    }

    /// Element by 0-based index
    pub fn get(&self, index: usize) -> Option<&FhirPathValue> {
        self.0.get(index)
    }

    /// First element
    pub fn first(&self) -> Option<&FhirPathValue> {
        self.0.first()
    }

    /// Last element
    pub fn last(&self) -> Option<&FhirPathValue> {
        self.0.last()
    }

    /// The single element of a singleton collection
    pub fn as_singleton(&self) -> Option<&FhirPathValue> {
        if self.0.len() == 1 { self.0.first() } else { None }
    }

    /// Borrow as a slice
    pub fn as_slice(&self) -> &[FhirPathValue] {
        &self.0
    }

    /// Copy out to a vector
    pub fn to_vec(&self) -> Vec<FhirPathValue> {
        self.0.to_vec()
    }

    /// Cheap share of the backing storage
    pub fn share(&self) -> Self {
        Self(Arc::clone(&self.0))
    }

    /// Concatenate, preserving order and duplicates
    pub fn concat(&self, other: &Collection) -> Self {
        if self.is_empty() {
            return other.share();
        }
        if other.is_empty() {
            return self.share();
        }
        let mut out = self.to_vec();
        out.extend(other.iter().cloned());
        Self::from_vec(out)
    }

    /// Membership under value equality
    pub fn contains_value(&self, value: &FhirPathValue) -> bool {
        self.iter().any(|v| values_equal(v, value))
    }

    /// Order-preserving de-duplication under value equality
    pub fn distinct(&self) -> Self {
        let mut out: Vec<FhirPathValue> = Vec::with_capacity(self.len());
        for value in self.iter() {
            if !out.iter().any(|seen| values_equal(seen, value)) {
                out.push(value.clone());
            }
        }
        Self::from_vec(out)
    }

    /// Union with de-duplication (the `|` operator)
    pub fn union(&self, other: &Collection) -> Self {
        self.concat(other).distinct()
    }

    /// Render to a JSON array
    pub fn to_json(&self) -> JsonValue {
        JsonValue::Array(self.iter().map(FhirPathValue::to_json).collect())
    }
}

impl PartialEq for Collection {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .zip(other.iter())
                .all(|(a, b)| values_equal(a, b))
    }
}

impl FromIterator<FhirPathValue> for Collection {
    fn from_iter<I: IntoIterator<Item = FhirPathValue>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a FhirPathValue;
    type IntoIter = std::slice::Iter<'a, FhirPathValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl From<FhirPathValue> for Collection {
    fn from(value: FhirPathValue) -> Self {
        Collection::singleton(value)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, value) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str("]")
    }
}

/// Parse a date literal body; partial dates resolve to the first day of
/// their period.
pub(crate) fn parse_date(text: &str) -> Option<NaiveDate> {
    match text.len() {
        4 => {
            let year: i32 = text.parse().ok()?;
            NaiveDate::from_ymd_opt(year, 1, 1)
        }
        7 => {
            let (y, m) = text.split_once('-')?;
            NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, 1)
        }
        10 => NaiveDate::parse_from_str(text, "%Y-%m-%d").ok(),
        _ => None,
    }
}

/// Parse a datetime literal body; a missing time means midnight and a
/// missing offset means UTC.
pub(crate) fn parse_datetime(text: &str) -> Option<DateTime<FixedOffset>> {
    let (date_part, time_part) = match text.split_once('T') {
        Some((d, t)) => (d, t),
        None => (text, ""),
    };
    let date = parse_date(date_part)?;

    if time_part.is_empty() {
        let naive = date.and_hms_opt(0, 0, 0)?;
        return Some(Utc.from_utc_datetime(&naive).fixed_offset());
    }

    // Split off a trailing timezone designator
    let (clock, offset) = split_timezone(time_part);
    let time = parse_time(clock)?;
    let naive = date.and_time(time);
    let offset = match offset {
        Some("Z") | None => FixedOffset::east_opt(0)?,
        Some(tz) => parse_offset(tz)?,
    };
    offset.from_local_datetime(&naive).single()
}

fn split_timezone(time_part: &str) -> (&str, Option<&str>) {
    if let Some(stripped) = time_part.strip_suffix('Z') {
        return (stripped, Some("Z"));
    }
    if let Some(pos) = time_part.rfind(['+', '-']) {
        return (&time_part[..pos], Some(&time_part[pos..]));
    }
    (time_part, None)
}

fn parse_offset(tz: &str) -> Option<FixedOffset> {
    let sign = match tz.as_bytes().first()? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let (hours, minutes) = tz[1..].split_once(':')?;
    let seconds = sign * (hours.parse::<i32>().ok()? * 3600 + minutes.parse::<i32>().ok()? * 60);
    FixedOffset::east_opt(seconds)
}

/// Parse a time literal body; missing minute/second components are zero.
pub(crate) fn parse_time(text: &str) -> Option<NaiveTime> {
    let mut parts = text.splitn(3, ':');
    let hour: u32 = parts.next()?.parse().ok()?;
    let minute: u32 = parts.next().map_or(Some(0), |m| m.parse().ok())?;
    let (second, nanos) = match parts.next() {
        Some(rest) => match rest.split_once('.') {
            Some((s, frac)) => {
                let padded = format!("{frac:0<9}");
                (s.parse().ok()?, padded[..9].parse().ok()?)
            }
            None => (rest.parse().ok()?, 0),
        },
        None => (0, 0),
    };
    NaiveTime::from_hms_nano_opt(hour, minute, second, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn integer_equals_decimal() {
        assert!(values_equal(
            &FhirPathValue::Integer(1),
            &FhirPathValue::Decimal("1.0".parse().unwrap())
        ));
    }

    #[test]
    fn string_equivalence_ignores_case_and_whitespace() {
        let a = FhirPathValue::String("Hello   World".to_string());
        let b = FhirPathValue::String("hello world".to_string());
        assert!(values_equivalent(&a, &b));
        assert!(!values_equal(&a, &b));
    }

    #[test]
    fn json_string_meets_date_literal() {
        let s = FhirPathValue::String("1985-08-15".to_string());
        let d = FhirPathValue::Date(NaiveDate::from_ymd_opt(1985, 8, 15).unwrap());
        assert!(values_equal(&s, &d));
    }

    #[test]
    fn collection_from_json_flattens_arrays() {
        let c = Collection::from_json(&json!(["a", "b"]));
        assert_eq!(c.len(), 2);
        let single = Collection::from_json(&json!({"resourceType": "Patient"}));
        assert_eq!(single.len(), 1);
        assert!(Collection::from_json(&json!(null)).is_empty());
    }

    #[test]
    fn distinct_preserves_first_occurrence_order() {
        let c = Collection::from_vec(vec![
            FhirPathValue::String("Smith".into()),
            FhirPathValue::String("Sarah".into()),
            FhirPathValue::String("Smith".into()),
        ]);
        let d = c.distinct();
        assert_eq!(d.len(), 2);
        assert_eq!(d.get(0).unwrap().as_string(), Some("Smith"));
        assert_eq!(d.get(1).unwrap().as_string(), Some("Sarah"));
    }

    #[test]
    fn union_deduplicates_concat_does_not() {
        let a = Collection::singleton(FhirPathValue::Integer(1));
        let b = Collection::from_vec(vec![FhirPathValue::Integer(1), FhirPathValue::Integer(2)]);
        assert_eq!(a.union(&b).len(), 2);
        assert_eq!(a.concat(&b).len(), 3);
    }

    #[test]
    fn parses_partial_dates() {
        assert_eq!(
            parse_date("2023"),
            NaiveDate::from_ymd_opt(2023, 1, 1)
        );
        assert_eq!(
            parse_date("2023-05"),
            NaiveDate::from_ymd_opt(2023, 5, 1)
        );
        assert_eq!(parse_date("bogus"), None);
    }

    #[test]
    fn parses_datetime_with_and_without_offset() {
        let utc = parse_datetime("2023-05-01T12:30:00").unwrap();
        assert_eq!(utc.offset().local_minus_utc(), 0);
        let offset = parse_datetime("2023-05-01T12:30:00+02:00").unwrap();
        assert_eq!(offset.offset().local_minus_utc(), 7200);
    }

    #[test]
    fn parses_fractional_seconds() {
        let t = parse_time("14:30:05.25").unwrap();
        assert_eq!(t.format("%H:%M:%S%.3f").to_string(), "14:30:05.250");
    }

    #[test]
    fn children_of_composite() {
        let patient = FhirPathValue::from_json(&json!({
            "resourceType": "Patient",
            "active": true,
            "name": [{"family": "Smith"}, {"family": "Jones"}]
        }))
        .unwrap();
        let children = patient.children();
        // resourceType is skipped; the name array contributes two nodes
        assert_eq!(children.len(), 3);
    }
}
