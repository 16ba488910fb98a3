//! Model provider contract
//!
//! The analyzer resolves resource types, element navigation and subtype
//! relations through this trait; the engine itself ships no FHIR schemas.
//! Providers are read-only and must be shareable across threads.

use super::types::TypeInfo;
use rustc_hash::FxHashMap;

/// External type/schema resolution for a concrete data model (FHIR)
pub trait ModelProvider: Send + Sync {
    /// Resolve a type by name (`Patient`, `HumanName`)
    fn get_type(&self, name: &str) -> Option<TypeInfo>;

    /// Resolve the type of a named element of `parent`
    fn get_element_type(&self, parent: &TypeInfo, element_name: &str) -> Option<TypeInfo>;

    /// The joined type of all child elements of `parent`, used by
    /// `children()`/`descendants()`
    fn get_children_type(&self, parent: &TypeInfo) -> Option<TypeInfo>;

    /// Model-aware subtype check
    fn is_assignable(&self, from: &TypeInfo, to: &TypeInfo) -> bool;

    /// Display name of a type in this model
    fn type_name(&self, t: &TypeInfo) -> String {
        t.display_name()
    }
}

/// In-memory provider backed by declared type tables.
///
/// Intended for tests and embedders with a fixed, known schema; real FHIR
/// deployments plug in a schema-backed provider instead.
#[derive(Default)]
pub struct StaticModelProvider {
    types: FxHashMap<String, TypeInfo>,
}

impl StaticModelProvider {
    /// Empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named type; its `elements` table drives navigation
    pub fn with_type(mut self, name: impl Into<String>, info: TypeInfo) -> Self {
        self.types.insert(name.into(), info);
        self
    }
}

impl ModelProvider for StaticModelProvider {
    fn get_type(&self, name: &str) -> Option<TypeInfo> {
        let bare = name.strip_prefix("FHIR.").unwrap_or(name);
        self.types.get(bare).cloned()
    }

    fn get_element_type(&self, parent: &TypeInfo, element_name: &str) -> Option<TypeInfo> {
        if let Some(elements) = &parent.elements {
            if let Some(found) = elements.get(element_name) {
                return Some(found.clone());
            }
        }
        // Fall back to the registered definition of the parent type
        let name = parent.name.as_deref()?;
        let declared = self.types.get(name)?;
        declared
            .elements
            .as_ref()
            .and_then(|e| e.get(element_name))
            .cloned()
    }

    fn get_children_type(&self, parent: &TypeInfo) -> Option<TypeInfo> {
        let name = parent.name.as_deref()?;
        let declared = self.types.get(name)?;
        let elements = declared.elements.as_ref()?;
        let choices: Vec<TypeInfo> = elements.values().cloned().collect();
        match choices.len() {
            0 => None,
            1 => choices.into_iter().next().map(|t| t.with_singleton(false)),
            _ => Some(TypeInfo::union_of(choices).with_singleton(false)),
        }
    }

    fn is_assignable(&self, from: &TypeInfo, to: &TypeInfo) -> bool {
        from.same_base(to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TypeKind;
    use rustc_hash::FxHashMap;

    fn patient_provider() -> StaticModelProvider {
        let mut elements = FxHashMap::default();
        elements.insert(
            "birthDate".to_string(),
            TypeInfo::singleton(TypeKind::Date),
        );
        elements.insert(
            "name".to_string(),
            TypeInfo::model("FHIR", "HumanName").with_singleton(false),
        );
        let patient = TypeInfo {
            elements: Some(elements),
            ..TypeInfo::model("FHIR", "Patient")
        };
        StaticModelProvider::new().with_type("Patient", patient)
    }

    #[test]
    fn resolves_registered_types() {
        let provider = patient_provider();
        assert!(provider.get_type("Patient").is_some());
        assert!(provider.get_type("FHIR.Patient").is_some());
        assert!(provider.get_type("Observation").is_none());
    }

    #[test]
    fn navigates_elements() {
        let provider = patient_provider();
        let patient = provider.get_type("Patient").unwrap();
        let birth = provider.get_element_type(&patient, "birthDate").unwrap();
        assert_eq!(birth.kind, TypeKind::Date);
        assert!(provider.get_element_type(&patient, "bogus").is_none());
    }

    #[test]
    fn children_join_element_types() {
        let provider = patient_provider();
        let patient = provider.get_type("Patient").unwrap();
        let children = provider.get_children_type(&patient).unwrap();
        assert!(!children.singleton);
    }
}
