//! Structured diagnostics produced by the parser and analyzer

use crate::parser::Range;
use std::fmt;

/// Diagnostic severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Severity {
    /// Subtle suggestion
    Hint,
    /// Helpful information
    Information,
    /// May indicate a problem but does not prevent execution
    Warning,
    /// Prevents successful execution
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Hint => f.write_str("hint"),
            Severity::Information => f.write_str("info"),
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// Stable diagnostic codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DiagnosticCode {
    /// Structural parse failure
    ParseError,
    /// Operator not present in the registry
    UnknownOperator,
    /// Function not present in the registry
    UnknownFunction,
    /// Variable not declared
    UnknownVariable,
    /// Property not found on the focus type
    UnknownProperty,
    /// Argument count outside the declared arity
    WrongArgumentCount,
    /// No operator signature matches the operand types
    TypeMismatch,
    /// A collection arrived where a singleton is required
    SingletonRequired,
    /// Receiver type incompatible with the function's input type
    TypeNotAssignable,
    /// Type operation on a non-primitive type without a model provider
    ModelProviderRequired,
    /// `ofType` target absent from the union's choices
    InvalidTypeFilter,
    /// `is` target absent from the union's choices
    InvalidTypeTest,
    /// `as` target absent from the union's choices
    InvalidTypeCast,
}

impl DiagnosticCode {
    /// The stable string identifier for this code
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCode::ParseError => "parse-error",
            DiagnosticCode::UnknownOperator => "unknown-operator",
            DiagnosticCode::UnknownFunction => "unknown-function",
            DiagnosticCode::UnknownVariable => "unknown-variable",
            DiagnosticCode::UnknownProperty => "unknown-property",
            DiagnosticCode::WrongArgumentCount => "wrong-argument-count",
            DiagnosticCode::TypeMismatch => "type-mismatch",
            DiagnosticCode::SingletonRequired => "singleton-required",
            DiagnosticCode::TypeNotAssignable => "type-not-assignable",
            DiagnosticCode::ModelProviderRequired => "model-provider-required",
            DiagnosticCode::InvalidTypeFilter => "invalid-type-filter",
            DiagnosticCode::InvalidTypeTest => "invalid-type-test",
            DiagnosticCode::InvalidTypeCast => "invalid-type-cast",
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Related location attached to a diagnostic
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RelatedInformation {
    /// Location of the related information
    pub range: Range,
    /// Message describing the relation
    pub message: String,
}

/// A structured message with severity, code, range and human-readable text
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Diagnostic {
    /// Source range the diagnostic points at
    pub range: Range,
    /// Severity level
    pub severity: Severity,
    /// Stable code
    pub code: DiagnosticCode,
    /// Human-readable message
    pub message: String,
    /// Producer of the diagnostic (`"parser"` or `"analyzer"`)
    pub source: &'static str,
    /// Related locations
    pub related: Vec<RelatedInformation>,
}

impl Diagnostic {
    /// Create a new diagnostic
    pub fn new(
        range: Range,
        severity: Severity,
        code: DiagnosticCode,
        message: impl Into<String>,
        source: &'static str,
    ) -> Self {
        Self {
            range,
            severity,
            code,
            message: message.into(),
            source,
            related: Vec::new(),
        }
    }

    /// Parser-sourced error diagnostic
    pub fn parse_error(range: Range, message: impl Into<String>) -> Self {
        Self::new(
            range,
            Severity::Error,
            DiagnosticCode::ParseError,
            message,
            "parser",
        )
    }

    /// Analyzer-sourced diagnostic
    pub fn analysis(
        range: Range,
        severity: Severity,
        code: DiagnosticCode,
        message: impl Into<String>,
    ) -> Self {
        Self::new(range, severity, code, message, "analyzer")
    }

    /// Attach related information
    pub fn with_related(mut self, range: Range, message: impl Into<String>) -> Self {
        self.related.push(RelatedInformation {
            range,
            message: message.into(),
        });
        self
    }

    /// Check if this is an error
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}]: {} at {}",
            self.severity,
            self.code.as_str(),
            self.message,
            self.range.start
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Information);
        assert!(Severity::Information > Severity::Hint);
    }

    #[test]
    fn codes_are_stable_identifiers() {
        assert_eq!(DiagnosticCode::SingletonRequired.as_str(), "singleton-required");
        assert_eq!(DiagnosticCode::ParseError.as_str(), "parse-error");
        assert_eq!(
            DiagnosticCode::ModelProviderRequired.as_str(),
            "model-provider-required"
        );
    }
}
