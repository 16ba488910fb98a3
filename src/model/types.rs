//! Static type descriptions used by the analyzer and registry signatures

use rustc_hash::FxHashMap;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Primitive system types, plus `Any` as the unknown/top type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TypeKind {
    /// Unknown or unconstrained
    Any,
    /// Boolean
    Boolean,
    /// String
    String,
    /// 32/64-bit integer
    Integer,
    /// Long integer
    Long,
    /// Arbitrary-precision decimal
    Decimal,
    /// Date
    Date,
    /// DateTime
    DateTime,
    /// Time
    Time,
    /// Quantity
    Quantity,
}

impl TypeKind {
    /// System type name
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeKind::Any => "Any",
            TypeKind::Boolean => "Boolean",
            TypeKind::String => "String",
            TypeKind::Integer => "Integer",
            TypeKind::Long => "Long",
            TypeKind::Decimal => "Decimal",
            TypeKind::Date => "Date",
            TypeKind::DateTime => "DateTime",
            TypeKind::Time => "Time",
            TypeKind::Quantity => "Quantity",
        }
    }

    /// Resolve a system type name
    pub fn parse(name: &str) -> Option<TypeKind> {
        match name {
            "Any" => Some(TypeKind::Any),
            "Boolean" => Some(TypeKind::Boolean),
            "String" => Some(TypeKind::String),
            "Integer" => Some(TypeKind::Integer),
            "Long" => Some(TypeKind::Long),
            "Decimal" => Some(TypeKind::Decimal),
            "Date" => Some(TypeKind::Date),
            "DateTime" => Some(TypeKind::DateTime),
            "Time" => Some(TypeKind::Time),
            "Quantity" => Some(TypeKind::Quantity),
            _ => None,
        }
    }
}

/// Opaque handle a `ModelProvider` can attach to a type to find its way back
/// to model schemas
#[derive(Clone)]
pub struct ModelContext(pub Arc<dyn Any + Send + Sync>);

impl fmt::Debug for ModelContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ModelContext(..)")
    }
}

/// Inferred type and cardinality of an expression or value.
///
/// `singleton` distinguishes exactly-one values from zero-or-more
/// collections. Model types (resources, backbone elements) carry `namespace`
/// and `name`; polymorphic choice types set `union` with their `choices`.
#[derive(Debug, Clone, Default)]
pub struct TypeInfo {
    /// Primitive kind, `Any` for model types and unknowns
    pub kind: TypeKind,
    /// Exactly one element vs zero-or-more
    pub singleton: bool,
    /// Model namespace (`FHIR`), absent for system primitives
    pub namespace: Option<String>,
    /// Model type name (`Patient`), absent for system primitives
    pub name: Option<String>,
    /// True when this is a polymorphic choice type
    pub union: bool,
    /// The union's choices; non-empty iff `union`
    pub choices: Vec<TypeInfo>,
    /// Named element types, when statically known
    pub elements: Option<FxHashMap<String, TypeInfo>>,
    /// Provider-opaque context
    pub model_context: Option<ModelContext>,
}

impl Default for TypeKind {
    fn default() -> Self {
        TypeKind::Any
    }
}

impl TypeInfo {
    /// A singleton of the given primitive kind
    pub fn singleton(kind: TypeKind) -> Self {
        Self {
            kind,
            singleton: true,
            ..Default::default()
        }
    }

    /// A collection of the given primitive kind
    pub fn collection(kind: TypeKind) -> Self {
        Self {
            kind,
            singleton: false,
            ..Default::default()
        }
    }

    /// The unconstrained collection type
    pub fn any() -> Self {
        Self::collection(TypeKind::Any)
    }

    /// A singleton model type
    pub fn model(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: TypeKind::Any,
            singleton: true,
            namespace: Some(namespace.into()),
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// A polymorphic choice type over the given alternatives
    pub fn union_of(choices: Vec<TypeInfo>) -> Self {
        Self {
            kind: TypeKind::Any,
            singleton: choices.iter().all(|c| c.singleton),
            union: true,
            choices,
            ..Default::default()
        }
    }

    /// Same type with the given cardinality
    pub fn with_singleton(mut self, singleton: bool) -> Self {
        self.singleton = singleton;
        self
    }

    /// The element type: same type, singleton cardinality
    pub fn element(&self) -> TypeInfo {
        self.clone().with_singleton(true)
    }

    /// True when this is the `Any` kind without model information
    pub fn is_any(&self) -> bool {
        self.kind == TypeKind::Any && self.name.is_none() && !self.union
    }

    /// True for model (non-system) types
    pub fn is_model_type(&self) -> bool {
        self.name.is_some()
    }

    /// Equal base type, ignoring cardinality
    pub fn same_base(&self, other: &TypeInfo) -> bool {
        self.kind == other.kind && self.namespace == other.namespace && self.name == other.name
    }

    /// Human-readable name (`Integer`, `FHIR.Patient`, `choice<..>`)
    pub fn display_name(&self) -> String {
        if self.union {
            let names: Vec<String> = self.choices.iter().map(|c| c.display_name()).collect();
            return format!("choice<{}>", names.join(" | "));
        }
        match (&self.namespace, &self.name) {
            (Some(ns), Some(name)) => format!("{ns}.{name}"),
            (None, Some(name)) => name.clone(),
            _ => self.kind.as_str().to_string(),
        }
    }

    /// Resolve a type name against the system namespace
    pub fn system(name: &str) -> Option<TypeInfo> {
        let bare = name.strip_prefix("System.").unwrap_or(name);
        TypeKind::parse(bare).map(TypeInfo::singleton)
    }
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        // model_context is provider-opaque and excluded from equality
        self.kind == other.kind
            && self.singleton == other.singleton
            && self.namespace == other.namespace
            && self.name == other.name
            && self.union == other.union
            && self.choices == other.choices
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.singleton {
            write!(f, "{}", self.display_name())
        } else {
            write!(f, "{}[]", self.display_name())
        }
    }
}

/// The type-compatibility ladder, checked in order:
/// exact match, `Any` on either side, singleton promotion into a collection
/// of the same base, `Integer` as a subtype of `Decimal`, then any
/// provider-known subtype relation.
pub fn is_compatible(
    source: &TypeInfo,
    target: &TypeInfo,
    provider: Option<&dyn super::provider::ModelProvider>,
) -> bool {
    if source == target {
        return true;
    }
    if source.kind == TypeKind::Any && !source.is_model_type()
        || target.kind == TypeKind::Any && !target.is_model_type()
    {
        return true;
    }
    if source.singleton && !target.singleton && source.same_base(target) {
        return true;
    }
    if source.kind == TypeKind::Integer
        && target.kind == TypeKind::Decimal
        && (source.singleton == target.singleton || source.singleton)
    {
        return true;
    }
    if source.union && source.choices.iter().all(|c| is_compatible(c, target, provider)) {
        return true;
    }
    if let Some(provider) = provider {
        return provider.is_assignable(source, target);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_is_compatible() {
        let a = TypeInfo::singleton(TypeKind::String);
        assert!(is_compatible(&a, &a.clone(), None));
    }

    #[test]
    fn any_is_compatible_both_ways() {
        let any = TypeInfo::any();
        let s = TypeInfo::singleton(TypeKind::String);
        assert!(is_compatible(&any, &s, None));
        assert!(is_compatible(&s, &any, None));
    }

    #[test]
    fn singleton_promotes_into_collection() {
        let one = TypeInfo::singleton(TypeKind::Integer);
        let many = TypeInfo::collection(TypeKind::Integer);
        assert!(is_compatible(&one, &many, None));
        assert!(!is_compatible(&many, &one, None));
    }

    #[test]
    fn integer_is_subtype_of_decimal() {
        let i = TypeInfo::singleton(TypeKind::Integer);
        let d = TypeInfo::singleton(TypeKind::Decimal);
        assert!(is_compatible(&i, &d, None));
        assert!(!is_compatible(&d, &i, None));
    }

    #[test]
    fn union_display() {
        let u = TypeInfo::union_of(vec![
            TypeInfo::singleton(TypeKind::Quantity),
            TypeInfo::singleton(TypeKind::String),
        ]);
        assert_eq!(u.display_name(), "choice<Quantity | String>");
        assert!(u.union);
    }

    #[test]
    fn system_name_resolution() {
        assert_eq!(
            TypeInfo::system("System.Boolean"),
            Some(TypeInfo::singleton(TypeKind::Boolean))
        );
        assert_eq!(TypeInfo::system("Patient"), None);
    }
}
