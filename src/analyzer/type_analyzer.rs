//! The annotation/validation traversal

use super::{AnalysisMode, AnalysisResult, AnalyzerOptions};
use crate::ast::{
    BinaryData, BinaryOperator, Expression, ExpressionNode, LiteralValue,
};
use crate::diagnostics::{Diagnostic, DiagnosticCode, Severity};
use crate::model::{ModelProvider, TypeInfo, TypeKind, is_compatible};
use crate::parser::Range;
use crate::registry::{
    FunctionRegistry, OperatorForm, OperatorRegistry, ParameterKind, SignatureType,
};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Higher-order functions that bind `$this` to the input element while
/// annotating their expression arguments
const ITERATORS: &[&str] = &["where", "select", "all", "exists", "repeat"];

/// The static analyzer
pub struct Analyzer<'a> {
    functions: &'a FunctionRegistry,
    operators: &'a OperatorRegistry,
    provider: Option<Arc<dyn ModelProvider>>,
    mode: AnalysisMode,
    custom_functions: Vec<String>,
    diagnostics: Vec<Diagnostic>,
    variables: FxHashMap<String, TypeInfo>,
    this_type: Option<TypeInfo>,
    total_type: Option<TypeInfo>,
}

impl<'a> Analyzer<'a> {
    /// Create an analyzer over the given registries
    pub fn new(
        functions: &'a FunctionRegistry,
        operators: &'a OperatorRegistry,
        provider: Option<Arc<dyn ModelProvider>>,
    ) -> Self {
        Self {
            functions,
            operators,
            provider,
            mode: AnalysisMode::default(),
            custom_functions: Vec::new(),
            diagnostics: Vec::new(),
            variables: FxHashMap::default(),
            this_type: None,
            total_type: None,
        }
    }

    /// Run analysis over an AST, consuming the analyzer
    pub fn analyze(mut self, mut ast: Expression, options: AnalyzerOptions) -> AnalysisResult {
        self.mode = options.mode;
        self.custom_functions = options.custom_functions;
        self.variables = options.user_variables;
        let input_type = options.input_type.unwrap_or_else(TypeInfo::any);
        self.variables
            .entry("context".to_string())
            .or_insert_with(|| input_type.clone());
        self.variables
            .entry("resource".to_string())
            .or_insert_with(|| input_type.clone());
        self.variables
            .entry("rootResource".to_string())
            .or_insert_with(|| input_type.clone());

        self.annotate(&mut ast, &input_type);
        AnalysisResult {
            ast,
            diagnostics: self.diagnostics,
        }
    }

    fn type_severity(&self) -> Severity {
        match self.mode {
            AnalysisMode::Strict => Severity::Error,
            AnalysisMode::Lenient => Severity::Warning,
        }
    }

    fn report(&mut self, range: Range, severity: Severity, code: DiagnosticCode, message: String) {
        self.diagnostics
            .push(Diagnostic::analysis(range, severity, code, message));
    }

    /// Infer the node's type against the current focus type, annotate it in
    /// place and return the inference
    fn annotate(&mut self, expr: &mut Expression, focus: &TypeInfo) -> TypeInfo {
        let inferred = match &expr.node {
            ExpressionNode::Literal(literal) => literal_type(literal),
            ExpressionNode::Variable(name) => {
                let name = name.clone();
                self.variable_type(&name, focus, expr.range)
            }
            ExpressionNode::Identifier(name) | ExpressionNode::TypeOrIdentifier(name) => {
                let name = name.clone();
                self.navigation_type(&name, focus, expr.range)
            }
            ExpressionNode::Binary(_) => self.annotate_binary(expr, focus),
            ExpressionNode::Unary { .. } => self.annotate_unary(expr, focus),
            ExpressionNode::Index(_) => self.annotate_index(expr, focus),
            ExpressionNode::Function(_) => self.annotate_function(expr, focus),
            ExpressionNode::Collection(_) => self.annotate_collection(expr, focus),
            ExpressionNode::MembershipTest(_) => self.annotate_type_op(expr, focus, true),
            ExpressionNode::TypeCast(_) => self.annotate_type_op(expr, focus, false),
            // Quiet resolution: the owning is/as/ofType call reports
            ExpressionNode::TypeReference(name) => {
                let name = name.clone();
                self.resolve_type_quietly(&name).unwrap_or_else(TypeInfo::any)
            }
            // Error nodes analyze as Any so the rest of the tree is checked
            ExpressionNode::Error(_) => TypeInfo::any(),
        };
        expr.type_info = Some(inferred.clone());
        inferred
    }

    fn variable_type(&mut self, name: &str, focus: &TypeInfo, range: Range) -> TypeInfo {
        match name {
            "$index" => TypeInfo::singleton(TypeKind::Integer),
            "$this" => self
                .this_type
                .clone()
                .unwrap_or_else(|| focus.clone()),
            "$total" => self.total_type.clone().unwrap_or_else(TypeInfo::any),
            _ => {
                let bare = name.strip_prefix('%').unwrap_or(name);
                match self.variables.get(bare) {
                    Some(t) => t.clone(),
                    None => {
                        self.report(
                            range,
                            Severity::Error,
                            DiagnosticCode::UnknownVariable,
                            format!("unknown variable %{bare}"),
                        );
                        TypeInfo::any()
                    }
                }
            }
        }
    }

    fn navigation_type(&mut self, name: &str, focus: &TypeInfo, range: Range) -> TypeInfo {
        // Union focus: join the navigations over every choice
        if focus.union {
            let mut results: Vec<TypeInfo> = Vec::new();
            for choice in focus.choices.clone() {
                let provider = self.provider.clone();
                if let Some(p) = &provider {
                    if let Some(t) = p.get_element_type(&choice, name) {
                        results.push(t);
                    }
                }
            }
            return match results.len() {
                0 => TypeInfo::any(),
                1 => results.into_iter().next().unwrap(),
                _ => TypeInfo::union_of(results),
            };
        }

        let Some(provider) = self.provider.clone() else {
            return TypeInfo::any();
        };
        if focus.is_any() {
            // Uppercase names may be resource-type filters
            if name.chars().next().is_some_and(char::is_uppercase) {
                if let Some(t) = provider.get_type(name) {
                    return t.with_singleton(false);
                }
            }
            return TypeInfo::any();
        }

        if let Some(element) = provider.get_element_type(focus, name) {
            // A collection focus spreads its cardinality over the element
            return if focus.singleton {
                element
            } else {
                element.with_singleton(false)
            };
        }
        if name.chars().next().is_some_and(char::is_uppercase) {
            if let Some(t) = provider.get_type(name) {
                return t.with_singleton(false);
            }
        }
        self.report(
            range,
            match self.mode {
                AnalysisMode::Strict => Severity::Error,
                AnalysisMode::Lenient => Severity::Warning,
            },
            DiagnosticCode::UnknownProperty,
            format!(
                "property '{name}' not found on {}",
                self.provider
                    .as_ref()
                    .map(|p| p.type_name(focus))
                    .unwrap_or_else(|| focus.display_name())
            ),
        );
        TypeInfo::any()
    }

    fn annotate_binary(&mut self, expr: &mut Expression, focus: &TypeInfo) -> TypeInfo {
        let range = expr.range;
        let ExpressionNode::Binary(data) = &mut expr.node else {
            unreachable!("annotate_binary on non-binary node");
        };
        match data.op {
            BinaryOperator::Navigation => {
                let left = self.annotate(&mut data.left, focus);
                self.annotate(&mut data.right, &left)
            }
            BinaryOperator::Union => {
                // Sibling branches do not share defineVariable bindings
                let saved = self.variables.clone();
                let left = self.annotate(&mut data.left, focus);
                self.variables = saved.clone();
                let right = self.annotate(&mut data.right, focus);
                self.variables = saved;
                join_types(&left, &right).with_singleton(false)
            }
            op => self.annotate_operator(op, range, data, focus),
        }
    }

    fn annotate_operator(
        &mut self,
        op: BinaryOperator,
        range: Range,
        data: &mut BinaryData,
        focus: &TypeInfo,
    ) -> TypeInfo {
        let left = self.annotate(&mut data.left, focus);
        let right = self.annotate(&mut data.right, focus);

        let Some(operator) = self.operators.lookup_operator(op.symbol(), OperatorForm::Infix)
        else {
            self.report(
                range,
                Severity::Error,
                DiagnosticCode::UnknownOperator,
                format!("unknown operator '{op}'"),
            );
            return TypeInfo::any();
        };

        // Unknown operand types cannot be validated or used to pick an
        // overload
        if left.is_any() || right.is_any() {
            return TypeInfo::any();
        }

        let provider = self.provider.clone();
        let matched = operator.signatures.iter().find(|sig| {
            let right_ok = match &sig.right {
                Some(declared) => is_compatible(&right, declared, provider.as_deref()),
                None => false,
            };
            right_ok && is_compatible(&left, &sig.left, provider.as_deref())
        });
        match matched {
            Some(sig) => sig
                .result
                .resolve(None, Some(&left), Some(&right), None),
            None => {
                self.report(
                    range,
                    self.type_severity(),
                    DiagnosticCode::TypeMismatch,
                    format!(
                        "operator '{op}' is not applicable to {} and {}",
                        left.display_name(),
                        right.display_name()
                    ),
                );
                TypeInfo::any()
            }
        }
    }

    fn annotate_unary(&mut self, expr: &mut Expression, focus: &TypeInfo) -> TypeInfo {
        let range = expr.range;
        let ExpressionNode::Unary { op, operand } = &mut expr.node else {
            unreachable!("annotate_unary on non-unary node");
        };
        let op = *op;
        let operand_type = self.annotate(operand, focus);
        let Some(operator) = self
            .operators
            .lookup_operator(op.symbol(), OperatorForm::Prefix)
        else {
            self.report(
                range,
                Severity::Error,
                DiagnosticCode::UnknownOperator,
                format!("unknown prefix operator '{op}'"),
            );
            return TypeInfo::any();
        };
        let provider = self.provider.clone();
        let matched = operator
            .signatures
            .iter()
            .find(|sig| is_compatible(&operand_type, &sig.left, provider.as_deref()));
        match matched {
            Some(sig) => sig.result.resolve(None, Some(&operand_type), None, None),
            None => {
                self.report(
                    range,
                    self.type_severity(),
                    DiagnosticCode::TypeMismatch,
                    format!(
                        "prefix operator '{op}' is not applicable to {}",
                        operand_type.display_name()
                    ),
                );
                TypeInfo::any()
            }
        }
    }

    fn annotate_index(&mut self, expr: &mut Expression, focus: &TypeInfo) -> TypeInfo {
        let range = expr.range;
        let ExpressionNode::Index(data) = &mut expr.node else {
            unreachable!("annotate_index on non-index node");
        };
        let base = self.annotate(&mut data.base, focus);
        let index = self.annotate(&mut data.index, focus);
        let provider = self.provider.clone();
        if !is_compatible(
            &index,
            &TypeInfo::singleton(TypeKind::Integer),
            provider.as_deref(),
        ) {
            self.report(
                range,
                self.type_severity(),
                DiagnosticCode::TypeMismatch,
                format!("indexer expects Integer, found {}", index.display_name()),
            );
        }
        base.element()
    }

    fn annotate_collection(&mut self, expr: &mut Expression, focus: &TypeInfo) -> TypeInfo {
        let ExpressionNode::Collection(elements) = &mut expr.node else {
            unreachable!("annotate_collection on non-collection node");
        };
        let mut elements = std::mem::take(elements);
        let mut joined: Option<TypeInfo> = None;
        for element in &mut elements {
            let t = self.annotate(element, focus);
            joined = Some(match joined {
                None => t,
                Some(prev) => join_types(&prev, &t),
            });
        }
        if let ExpressionNode::Collection(slot) = &mut expr.node {
            *slot = elements;
        }
        joined.unwrap_or_else(TypeInfo::any).with_singleton(false)
    }

    fn annotate_type_op(
        &mut self,
        expr: &mut Expression,
        focus: &TypeInfo,
        is_test: bool,
    ) -> TypeInfo {
        let range = expr.range;
        let (inner, type_name) = {
            let (ExpressionNode::MembershipTest(data) | ExpressionNode::TypeCast(data)) =
                &mut expr.node
            else {
                unreachable!("annotate_type_op on non-type-op node");
            };
            let inner = self.annotate(&mut data.expression, focus);
            (inner, data.type_name.clone())
        };
        let target = self.check_type_operation(
            &type_name,
            &inner,
            range,
            if is_test {
                DiagnosticCode::InvalidTypeTest
            } else {
                DiagnosticCode::InvalidTypeCast
            },
        );
        if is_test {
            TypeInfo::singleton(TypeKind::Boolean)
        } else {
            let target = target.unwrap_or_else(TypeInfo::any);
            target.with_singleton(inner.singleton)
        }
    }

    /// Shared validation for `is`/`as`/`ofType` targets; returns the
    /// resolved target type when known
    fn check_type_operation(
        &mut self,
        type_name: &str,
        inner: &TypeInfo,
        range: Range,
        union_miss_code: DiagnosticCode,
    ) -> Option<TypeInfo> {
        let resolved = self.resolve_type_name(type_name, range);
        if let Some(target) = &resolved {
            if inner.union
                && !inner
                    .choices
                    .iter()
                    .any(|choice| choice.same_base(target))
            {
                self.report(
                    range,
                    Severity::Warning,
                    union_miss_code,
                    format!(
                        "type '{type_name}' is not among the choices of {}",
                        inner.display_name()
                    ),
                );
            }
        }
        resolved
    }

    fn resolve_type_quietly(&self, name: &str) -> Option<TypeInfo> {
        TypeInfo::system(name).or_else(|| self.provider.as_ref().and_then(|p| p.get_type(name)))
    }

    /// Resolve a type name against the System namespace and the model
    /// provider; reports `model-provider-required` for non-primitive names
    /// without a provider
    fn resolve_type_name(&mut self, name: &str, range: Range) -> Option<TypeInfo> {
        if let Some(system) = TypeInfo::system(name) {
            return Some(system);
        }
        match self.provider.clone() {
            Some(provider) => provider.get_type(name),
            None => {
                self.report(
                    range,
                    self.type_severity(),
                    DiagnosticCode::ModelProviderRequired,
                    format!("type '{name}' requires a model provider"),
                );
                None
            }
        }
    }

    fn annotate_function(&mut self, expr: &mut Expression, focus: &TypeInfo) -> TypeInfo {
        let range = expr.range;
        let ExpressionNode::Function(data) = &mut expr.node else {
            unreachable!("annotate_function on non-function node");
        };
        let Some(name) = data.name().map(str::to_string) else {
            self.report(
                range,
                Severity::Error,
                DiagnosticCode::UnknownFunction,
                "function callee must be a name".to_string(),
            );
            return TypeInfo::any();
        };

        // Method-call syntax: the receiver's type becomes the input type
        let input_type = match &mut data.callee.node {
            ExpressionNode::Binary(callee) if callee.op == BinaryOperator::Navigation => {
                let t = self.annotate(&mut callee.left, focus);
                callee.right.type_info = Some(t.clone());
                data.callee.type_info = Some(t.clone());
                t
            }
            _ => {
                data.callee.type_info = Some(focus.clone());
                focus.clone()
            }
        };

        if self.custom_functions.iter().any(|f| f == &name) {
            let mut arguments = std::mem::take(&mut data.arguments);
            for arg in &mut arguments {
                self.annotate(arg, focus);
            }
            restore_arguments(expr, arguments);
            return TypeInfo::any();
        }

        let Some(function) = self.functions.lookup(&name) else {
            self.report(
                range,
                Severity::Error,
                DiagnosticCode::UnknownFunction,
                format!("unknown function '{name}'"),
            );
            let mut arguments = std::mem::take(&mut data.arguments);
            for arg in &mut arguments {
                self.annotate(arg, focus);
            }
            restore_arguments(expr, arguments);
            return TypeInfo::any();
        };
        let signature = function.signature.clone();

        if !signature.accepts_arity(data.arguments.len()) {
            self.report(
                range,
                Severity::Error,
                DiagnosticCode::WrongArgumentCount,
                format!(
                    "function '{name}' expects {}..{} arguments, found {}",
                    signature.min_arity(),
                    signature.max_arity(),
                    data.arguments.len()
                ),
            );
        }

        // Receiver applicability
        if let Some(declared_input) = &signature.input {
            let provider = self.provider.clone();
            if !is_compatible(&input_type, declared_input, provider.as_deref()) {
                let cardinality_only =
                    input_type.same_base(declared_input) && !input_type.singleton;
                let (code, message) = if cardinality_only {
                    (
                        DiagnosticCode::SingletonRequired,
                        format!("function '{name}' requires a singleton input"),
                    )
                } else {
                    (
                        DiagnosticCode::TypeNotAssignable,
                        format!(
                            "function '{name}' is not applicable to input of type {}",
                            input_type.display_name()
                        ),
                    )
                };
                self.report(range, self.type_severity(), code, message);
            }
        }

        let mut arguments = std::mem::take(&mut data.arguments);
        let result = self.annotate_call(&name, &signature, &input_type, &mut arguments, range, focus);
        restore_arguments(expr, arguments);
        result
    }

    /// Annotate arguments and derive the call's result type, handling the
    /// built-ins with bespoke inference
    fn annotate_call(
        &mut self,
        name: &str,
        signature: &crate::registry::FunctionSignature,
        input_type: &TypeInfo,
        arguments: &mut [Expression],
        range: Range,
        focus: &TypeInfo,
    ) -> TypeInfo {
        match name {
            "iif" => {
                self.annotate_opt(arguments.get_mut(0), input_type);
                let then_type = self.annotate_opt(arguments.get_mut(1), input_type);
                let else_type = self.annotate_opt(arguments.get_mut(2), input_type);
                match (then_type, else_type) {
                    (Some(a), Some(b)) => join_types(&a, &b),
                    (Some(a), None) => a,
                    _ => TypeInfo::any(),
                }
            }
            "defineVariable" => {
                let value_type = match arguments.get_mut(1) {
                    Some(value_expr) => self.annotate(value_expr, input_type),
                    None => input_type.clone(),
                };
                self.annotate_opt(arguments.get_mut(0), input_type);
                if let Some(var_name) = arguments.first().and_then(literal_string) {
                    self.variables.insert(var_name, value_type);
                }
                input_type.clone()
            }
            "aggregate" => {
                let init_type = match arguments.get_mut(1) {
                    Some(init) => self.annotate(init, input_type),
                    None => TypeInfo::any(),
                };
                let element = input_type.element();
                let saved_this = self.this_type.replace(element.clone());
                let saved_total = self.total_type.replace(init_type);
                let result = self
                    .annotate_opt(arguments.get_mut(0), &element)
                    .unwrap_or_else(TypeInfo::any);
                self.this_type = saved_this;
                self.total_type = saved_total;
                result
            }
            "ofType" | "is" | "as" => {
                let target = match arguments.first().and_then(type_reference_name) {
                    Some(type_name) => self.check_type_operation(
                        &type_name,
                        input_type,
                        range,
                        if name == "ofType" {
                            DiagnosticCode::InvalidTypeFilter
                        } else if name == "is" {
                            DiagnosticCode::InvalidTypeTest
                        } else {
                            DiagnosticCode::InvalidTypeCast
                        },
                    ),
                    None => None,
                };
                for arg in arguments.iter_mut() {
                    self.annotate(arg, input_type);
                }
                match name {
                    "is" => TypeInfo::singleton(TypeKind::Boolean),
                    _ => target
                        .map(|t| t.with_singleton(false))
                        .unwrap_or_else(TypeInfo::any),
                }
            }
            "children" | "descendants" => {
                let provider = self.provider.clone();
                provider
                    .and_then(|p| p.get_children_type(input_type))
                    .unwrap_or_else(TypeInfo::any)
            }
            _ if ITERATORS.contains(&name) => {
                // Iterator arguments see a single element as their focus
                let element = input_type.element();
                let saved_this = self.this_type.replace(element.clone());
                let saved_variables = self.variables.clone();
                let arg_type = self.annotate_opt(arguments.first_mut(), &element);
                self.variables = saved_variables;
                self.this_type = saved_this;
                match name {
                    "where" => input_type.clone(),
                    "select" | "repeat" => arg_type
                        .map(|t| t.with_singleton(false))
                        .unwrap_or_else(TypeInfo::any),
                    _ => TypeInfo::singleton(TypeKind::Boolean),
                }
            }
            _ => {
                let mut first_param_type = None;
                for (i, arg) in arguments.iter_mut().enumerate() {
                    let arg_type = self.annotate(arg, focus);
                    if i == 0 {
                        first_param_type = Some(arg_type.clone());
                    }
                    if let Some(param) = signature.parameters.get(i) {
                        let provider = self.provider.clone();
                        if param.kind == ParameterKind::Value
                            && !is_compatible(&arg_type, &param.param_type, provider.as_deref())
                        {
                            self.report(
                                arg.range,
                                self.type_severity(),
                                DiagnosticCode::TypeMismatch,
                                format!(
                                    "argument '{}' of '{name}' expects {}, found {}",
                                    param.name,
                                    param.param_type.display_name(),
                                    arg_type.display_name()
                                ),
                            );
                        }
                    }
                }
                resolve_result(&signature.result, input_type, first_param_type.as_ref())
            }
        }
    }

    fn annotate_opt(
        &mut self,
        expr: Option<&mut Expression>,
        focus: &TypeInfo,
    ) -> Option<TypeInfo> {
        expr.map(|e| self.annotate(e, focus))
    }
}

fn resolve_result(
    result: &SignatureType,
    input_type: &TypeInfo,
    parameter: Option<&TypeInfo>,
) -> TypeInfo {
    result.resolve(Some(input_type), None, None, parameter)
}

fn restore_arguments(expr: &mut Expression, arguments: smallvec::SmallVec<[Expression; 4]>) {
    if let ExpressionNode::Function(data) = &mut expr.node {
        data.arguments = arguments;
    }
}

fn literal_string(expr: &Expression) -> Option<String> {
    match &expr.node {
        ExpressionNode::Literal(LiteralValue::String(s)) => Some(s.clone()),
        _ => None,
    }
}

fn type_reference_name(expr: &Expression) -> Option<String> {
    match &expr.node {
        ExpressionNode::TypeReference(name) => Some(name.clone()),
        ExpressionNode::Identifier(name) | ExpressionNode::TypeOrIdentifier(name) => {
            Some(name.clone())
        }
        _ => None,
    }
}

fn literal_type(literal: &LiteralValue) -> TypeInfo {
    match literal {
        LiteralValue::Boolean(_) => TypeInfo::singleton(TypeKind::Boolean),
        LiteralValue::Integer(_) => TypeInfo::singleton(TypeKind::Integer),
        LiteralValue::Decimal(_) => TypeInfo::singleton(TypeKind::Decimal),
        LiteralValue::String(_) => TypeInfo::singleton(TypeKind::String),
        LiteralValue::Date(_) => TypeInfo::singleton(TypeKind::Date),
        LiteralValue::DateTime(_) => TypeInfo::singleton(TypeKind::DateTime),
        LiteralValue::Time(_) => TypeInfo::singleton(TypeKind::Time),
        LiteralValue::Quantity { .. } => TypeInfo::singleton(TypeKind::Quantity),
        LiteralValue::Null => TypeInfo::any(),
    }
}

/// Least upper bound: identical types are preserved; the same base with
/// differing cardinality becomes a collection; anything else is `Any`
fn join_types(a: &TypeInfo, b: &TypeInfo) -> TypeInfo {
    if a == b {
        return a.clone();
    }
    if a.same_base(b) {
        return a.clone().with_singleton(false);
    }
    TypeInfo::any()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StaticModelProvider;
    use crate::parser::parse;
    use crate::registry::{default_function_registry, default_operator_registry};

    fn analyze(source: &str, options: AnalyzerOptions) -> AnalysisResult {
        let functions = default_function_registry();
        let operators = default_operator_registry();
        let analyzer = Analyzer::new(&functions, &operators, None);
        analyzer.analyze(parse(source).unwrap(), options)
    }

    fn analyze_with_provider(
        source: &str,
        provider: StaticModelProvider,
        options: AnalyzerOptions,
    ) -> AnalysisResult {
        let functions = default_function_registry();
        let operators = default_operator_registry();
        let analyzer = Analyzer::new(&functions, &operators, Some(Arc::new(provider)));
        analyzer.analyze(parse(source).unwrap(), options)
    }

    fn patient_provider() -> StaticModelProvider {
        let mut name_elements = FxHashMap::default();
        name_elements.insert(
            "family".to_string(),
            TypeInfo::singleton(TypeKind::String),
        );
        name_elements.insert(
            "given".to_string(),
            TypeInfo::collection(TypeKind::String),
        );
        let human_name = TypeInfo {
            elements: Some(name_elements),
            ..TypeInfo::model("FHIR", "HumanName")
        };

        let mut patient_elements = FxHashMap::default();
        patient_elements.insert(
            "birthDate".to_string(),
            TypeInfo::singleton(TypeKind::Date),
        );
        patient_elements.insert(
            "active".to_string(),
            TypeInfo::singleton(TypeKind::Boolean),
        );
        patient_elements.insert(
            "name".to_string(),
            human_name.clone().with_singleton(false),
        );
        let patient = TypeInfo {
            elements: Some(patient_elements),
            ..TypeInfo::model("FHIR", "Patient")
        };

        StaticModelProvider::new()
            .with_type("Patient", patient)
            .with_type("HumanName", human_name)
    }

    #[test]
    fn literal_types() {
        let result = analyze("1 + 2", AnalyzerOptions::default());
        assert!(result.diagnostics.is_empty());
        let t = result.ast.type_info.as_ref().unwrap();
        assert_eq!(t.kind, TypeKind::Integer);
        assert!(t.singleton);
    }

    #[test]
    fn number_with_fraction_is_decimal() {
        let result = analyze("1.5", AnalyzerOptions::default());
        assert_eq!(result.ast.type_info.as_ref().unwrap().kind, TypeKind::Decimal);
    }

    #[test]
    fn unknown_function_is_reported() {
        let result = analyze("bogus()", AnalyzerOptions::default());
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.code == DiagnosticCode::UnknownFunction));
    }

    #[test]
    fn custom_functions_are_known() {
        let options = AnalyzerOptions {
            custom_functions: vec!["bogus".to_string()],
            ..Default::default()
        };
        let result = analyze("bogus()", options);
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn unknown_variable_is_reported() {
        let result = analyze("%undeclared", AnalyzerOptions::default());
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.code == DiagnosticCode::UnknownVariable));
    }

    #[test]
    fn declared_user_variable_types_flow() {
        let mut user_variables = FxHashMap::default();
        user_variables.insert("limit".to_string(), TypeInfo::singleton(TypeKind::Integer));
        let options = AnalyzerOptions {
            user_variables,
            ..Default::default()
        };
        let result = analyze("%limit + 1", options);
        assert!(result.diagnostics.is_empty());
        assert_eq!(result.ast.type_info.as_ref().unwrap().kind, TypeKind::Integer);
    }

    #[test]
    fn operator_type_mismatch_strict_vs_lenient() {
        let strict = analyze("1 and 2", AnalyzerOptions::default());
        assert!(strict.has_errors());

        let lenient = analyze(
            "1 and 2",
            AnalyzerOptions {
                mode: AnalysisMode::Lenient,
                ..Default::default()
            },
        );
        assert!(!lenient.has_errors());
        assert!(!lenient.diagnostics.is_empty());
    }

    #[test]
    fn wrong_argument_count() {
        let result = analyze("'abc'.substring()", AnalyzerOptions::default());
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.code == DiagnosticCode::WrongArgumentCount));
    }

    #[test]
    fn navigation_through_provider() {
        let options = AnalyzerOptions {
            input_type: Some(
                patient_provider().get_type("Patient").unwrap(),
            ),
            ..Default::default()
        };
        let result = analyze_with_provider("name.given", patient_provider(), options);
        assert!(result.diagnostics.is_empty());
        let t = result.ast.type_info.as_ref().unwrap();
        assert_eq!(t.kind, TypeKind::String);
        assert!(!t.singleton);
    }

    #[test]
    fn unknown_property_reported_with_provider() {
        let options = AnalyzerOptions {
            input_type: Some(patient_provider().get_type("Patient").unwrap()),
            ..Default::default()
        };
        let result = analyze_with_provider("bogusField", patient_provider(), options);
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.code == DiagnosticCode::UnknownProperty));
    }

    #[test]
    fn this_inside_iterator_is_element_type() {
        let options = AnalyzerOptions {
            input_type: Some(patient_provider().get_type("Patient").unwrap()),
            ..Default::default()
        };
        let result =
            analyze_with_provider("name.where(family = 'Smith')", patient_provider(), options);
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
        // where() preserves its input type
        let t = result.ast.type_info.as_ref().unwrap();
        assert_eq!(t.name.as_deref(), Some("HumanName"));
        assert!(!t.singleton);
    }

    #[test]
    fn iif_joins_branch_types() {
        let result = analyze("iif(true, 'a', 'b')", AnalyzerOptions::default());
        assert_eq!(result.ast.type_info.as_ref().unwrap().kind, TypeKind::String);

        let mixed = analyze("iif(true, 'a', 1)", AnalyzerOptions::default());
        assert_eq!(mixed.ast.type_info.as_ref().unwrap().kind, TypeKind::Any);
    }

    #[test]
    fn define_variable_binds_downstream_of_dot() {
        let result = analyze(
            "defineVariable('x', 1).select(%x)",
            AnalyzerOptions::default(),
        );
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn define_variable_does_not_cross_union() {
        let result = analyze(
            "defineVariable('x', 1).select(%x) | %x",
            AnalyzerOptions::default(),
        );
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.code == DiagnosticCode::UnknownVariable));
    }

    #[test]
    fn type_operation_without_provider_requires_model() {
        let result = analyze("value is Patient", AnalyzerOptions::default());
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.code == DiagnosticCode::ModelProviderRequired));
        // System primitives resolve without a provider
        let system = analyze("1 is Integer", AnalyzerOptions::default());
        assert!(system.diagnostics.is_empty());
    }

    #[test]
    fn union_choice_miss_is_a_warning() {
        let union = TypeInfo::union_of(vec![
            TypeInfo::singleton(TypeKind::Quantity),
            TypeInfo::singleton(TypeKind::String),
        ]);
        let options = AnalyzerOptions {
            input_type: Some(union),
            ..Default::default()
        };
        let result = analyze("$this is Boolean", options);
        let warning = result
            .diagnostics
            .iter()
            .find(|d| d.code == DiagnosticCode::InvalidTypeTest)
            .expect("invalid-type-test warning");
        assert_eq!(warning.severity, Severity::Warning);
    }

    #[test]
    fn singleton_required_vs_type_not_assignable() {
        // A collection input into a singleton-String function
        let options = AnalyzerOptions {
            input_type: Some(TypeInfo::collection(TypeKind::String)),
            ..Default::default()
        };
        let result = analyze("upper()", options);
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.code == DiagnosticCode::SingletonRequired));

        let options = AnalyzerOptions {
            input_type: Some(TypeInfo::singleton(TypeKind::Integer)),
            ..Default::default()
        };
        let result = analyze("upper()", options);
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.code == DiagnosticCode::TypeNotAssignable));
    }

    #[test]
    fn error_nodes_analyze_as_any() {
        let parsed = crate::parser::parse_with_options(
            "1 + ",
            crate::parser::ParseOptions {
                error_recovery: true,
                preserve_trivia: false,
            },
        );
        let functions = default_function_registry();
        let operators = default_operator_registry();
        let analyzer = Analyzer::new(&functions, &operators, None);
        let result = analyzer.analyze(parsed.ast, AnalyzerOptions::default());
        // Analysis completes and annotates the tree
        assert!(result.ast.type_info.is_some());
    }
}
