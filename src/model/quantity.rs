//! Quantity values
//!
//! A quantity pairs a decimal value with an optional unit. Units are either
//! calendar-duration keywords (`year` .. `millisecond`, normalized to their
//! singular form) or opaque UCUM-style codes. Arithmetic between quantities
//! requires equal units; unit conversion belongs to an external UCUM service
//! and is not attempted here.

use rust_decimal::Decimal;
use std::fmt;

/// Calendar duration units recognized in quantity literals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalendarUnit {
    /// `year`/`years`
    Year,
    /// `month`/`months`
    Month,
    /// `week`/`weeks`
    Week,
    /// `day`/`days`
    Day,
    /// `hour`/`hours`
    Hour,
    /// `minute`/`minutes`
    Minute,
    /// `second`/`seconds`
    Second,
    /// `millisecond`/`milliseconds`
    Millisecond,
}

impl CalendarUnit {
    /// Parse a calendar unit keyword, accepting plural forms
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "year" | "years" => Some(CalendarUnit::Year),
            "month" | "months" => Some(CalendarUnit::Month),
            "week" | "weeks" => Some(CalendarUnit::Week),
            "day" | "days" => Some(CalendarUnit::Day),
            "hour" | "hours" => Some(CalendarUnit::Hour),
            "minute" | "minutes" => Some(CalendarUnit::Minute),
            "second" | "seconds" => Some(CalendarUnit::Second),
            "millisecond" | "milliseconds" => Some(CalendarUnit::Millisecond),
            _ => None,
        }
    }

    /// Singular keyword form
    pub fn as_str(&self) -> &'static str {
        match self {
            CalendarUnit::Year => "year",
            CalendarUnit::Month => "month",
            CalendarUnit::Week => "week",
            CalendarUnit::Day => "day",
            CalendarUnit::Hour => "hour",
            CalendarUnit::Minute => "minute",
            CalendarUnit::Second => "second",
            CalendarUnit::Millisecond => "millisecond",
        }
    }
}

/// A quantity value with an optional unit
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Quantity {
    /// Numeric value
    pub value: Decimal,
    /// Unit code; `None` for dimensionless quantities
    pub unit: Option<String>,
}

impl Quantity {
    /// Create a quantity, normalizing calendar-unit keywords to singular
    pub fn new(value: Decimal, unit: Option<String>) -> Self {
        let unit = unit.map(|u| match CalendarUnit::parse(&u) {
            Some(cal) => cal.as_str().to_string(),
            None => u,
        });
        Self { value, unit }
    }

    /// Dimensionless quantity
    pub fn dimensionless(value: Decimal) -> Self {
        Self { value, unit: None }
    }

    /// The calendar unit, when the unit is a calendar keyword
    pub fn calendar_unit(&self) -> Option<CalendarUnit> {
        self.unit.as_deref().and_then(CalendarUnit::parse)
    }

    /// Units are directly comparable when equal (or both absent). The `'1'`
    /// UCUM code is treated as dimensionless.
    pub fn same_unit(&self, other: &Quantity) -> bool {
        normalize_unit(self.unit.as_deref()) == normalize_unit(other.unit.as_deref())
    }

    /// Add two quantities; `None` when units differ
    pub fn checked_add(&self, other: &Quantity) -> Option<Quantity> {
        self.same_unit(other).then(|| Quantity {
            value: self.value + other.value,
            unit: self.unit.clone(),
        })
    }

    /// Subtract two quantities; `None` when units differ
    pub fn checked_sub(&self, other: &Quantity) -> Option<Quantity> {
        self.same_unit(other).then(|| Quantity {
            value: self.value - other.value,
            unit: self.unit.clone(),
        })
    }

    /// Multiply by a dimensionless scalar
    pub fn scale(&self, factor: Decimal) -> Quantity {
        Quantity {
            value: self.value * factor,
            unit: self.unit.clone(),
        }
    }

    /// Divide by a dimensionless scalar; `None` for zero
    pub fn checked_div_scalar(&self, divisor: Decimal) -> Option<Quantity> {
        if divisor.is_zero() {
            return None;
        }
        Some(Quantity {
            value: self.value / divisor,
            unit: self.unit.clone(),
        })
    }

    /// Divide by a same-unit quantity yielding a dimensionless ratio
    pub fn checked_ratio(&self, other: &Quantity) -> Option<Quantity> {
        if !self.same_unit(other) || other.value.is_zero() {
            return None;
        }
        Some(Quantity::dimensionless(self.value / other.value))
    }
}

fn normalize_unit(unit: Option<&str>) -> Option<&str> {
    match unit {
        None | Some("1") | Some("") => None,
        Some(u) => Some(u),
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.unit {
            Some(unit) => write!(f, "{} '{}'", self.value, unit),
            None => write!(f, "{}", self.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn calendar_units_normalize_to_singular() {
        let q = Quantity::new(dec("4"), Some("days".to_string()));
        assert_eq!(q.unit.as_deref(), Some("day"));
        assert_eq!(q.calendar_unit(), Some(CalendarUnit::Day));
    }

    #[test]
    fn addition_requires_same_unit() {
        let a = Quantity::new(dec("5"), Some("mg".to_string()));
        let b = Quantity::new(dec("3"), Some("mg".to_string()));
        let c = Quantity::new(dec("3"), Some("kg".to_string()));
        assert_eq!(a.checked_add(&b).unwrap().value, dec("8"));
        assert!(a.checked_add(&c).is_none());
    }

    #[test]
    fn ucum_unity_is_dimensionless() {
        let a = Quantity::new(dec("2"), Some("1".to_string()));
        let b = Quantity::dimensionless(dec("2"));
        assert!(a.same_unit(&b));
    }

    #[test]
    fn ratio_of_same_unit_quantities() {
        let a = Quantity::new(dec("10"), Some("mg".to_string()));
        let b = Quantity::new(dec("4"), Some("mg".to_string()));
        let r = a.checked_ratio(&b).unwrap();
        assert_eq!(r.value, dec("2.5"));
        assert!(r.unit.is_none());
    }
}
