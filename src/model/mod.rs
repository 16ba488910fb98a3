//! Value and type model
//!
//! Runtime values ([`FhirPathValue`], [`Collection`]), quantities, static
//! type descriptions ([`TypeInfo`]) and the [`ModelProvider`] contract.

mod provider;
mod quantity;
mod types;
mod value;

pub use provider::{ModelProvider, StaticModelProvider};
pub use quantity::{CalendarUnit, Quantity};
pub use types::{ModelContext, TypeInfo, TypeKind, is_compatible};
pub use value::{Collection, FhirPathValue, values_equal, values_equivalent};

pub(crate) use value::{append_json, parse_date, parse_datetime, parse_time};
