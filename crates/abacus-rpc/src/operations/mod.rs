//! Operation Registry: named, validated, pure arithmetic operations.
//!
//! An [`Operation`] declares its parameters and computes a number from
//! validated arguments. [`OperationRegistry::invoke`] runs validation and
//! computation and always produces exactly one [`OperationResult`], either
//! a success payload or a failure payload. Callers relay the result without
//! inspecting operation internals.

pub mod arithmetic;
pub mod validation;

use std::sync::Arc;

use abacus_core::constants::OPERATIONS_TOTAL;
use metrics::counter;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use self::validation::validate;

/// Why an operation produced a failure result.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum OperationError {
    /// Arguments failed validation (decode time).
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
    /// Divisor was zero.
    #[error("Division by zero is not allowed")]
    DivisionByZero,
    /// Result overflowed or was NaN.
    #[error("Result is infinite or not a number")]
    NonFinite,
    /// Square root of a negative value.
    #[error("Cannot calculate square root of a negative number")]
    NegativeSquareRoot,
}

/// A declared numeric parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Param {
    /// Argument key.
    pub name: &'static str,
    /// Human-readable description for the input schema.
    pub description: &'static str,
}

/// A pure function from named numeric arguments to a number.
pub trait Operation: Send + Sync {
    /// Name clients call (e.g. `add`).
    fn name(&self) -> &'static str;
    /// Label echoed in result payloads (e.g. `addition`).
    fn label(&self) -> &'static str;
    /// Short human title.
    fn title(&self) -> &'static str;
    /// One-line description.
    fn description(&self) -> &'static str;
    /// Declared parameters, in order.
    fn params(&self) -> &'static [Param];
    /// Compute from values in declared parameter order.
    fn compute(&self, values: &[f64]) -> Result<f64, OperationError>;

    /// JSON Schema for the arguments object.
    fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for p in self.params() {
            let _ = properties.insert(
                p.name.to_string(),
                json!({"type": "number", "description": p.description}),
            );
        }
        let required: Vec<&str> = self.params().iter().map(|p| p.name).collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Successful computation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SuccessPayload {
    /// Numeric result.
    pub result: Value,
    /// Operation label.
    pub operation: &'static str,
    /// Echo of the inputs.
    pub inputs: Map<String, Value>,
    /// RFC 3339 timestamp.
    pub timestamp: String,
}

/// Failed computation or validation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FailurePayload {
    /// Human-readable reason.
    pub error: String,
    /// Operation label.
    pub operation: &'static str,
    /// Best-effort echo of the inputs.
    pub inputs: Map<String, Value>,
    /// RFC 3339 timestamp.
    pub timestamp: String,
}

/// Exactly one result per invocation.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OperationResult {
    /// Success payload.
    Success(SuccessPayload),
    /// Failure payload.
    Failure(FailurePayload),
}

impl OperationResult {
    /// Whether this is a failure.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Payload as JSON.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Render a number the way JSON clients expect (`40`, not `40.0`).
pub(crate) fn number_value(n: f64) -> Value {
    const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        #[allow(clippy::cast_possible_truncation)]
        let int = n as i64;
        json!(int)
    } else {
        json!(n)
    }
}

/// Registry mapping operation names to implementations.
pub struct OperationRegistry {
    operations: Vec<Arc<dyn Operation>>,
}

impl OperationRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            operations: Vec::new(),
        }
    }

    /// Registry preloaded with the six arithmetic operations.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        arithmetic::register_all(&mut registry);
        registry
    }

    /// Register an operation; a later registration with the same name replaces it.
    pub fn register(&mut self, operation: impl Operation + 'static) {
        let operation: Arc<dyn Operation> = Arc::new(operation);
        if let Some(slot) = self
            .operations
            .iter_mut()
            .find(|op| op.name() == operation.name())
        {
            *slot = operation;
        } else {
            self.operations.push(operation);
        }
    }

    /// Look up an operation by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Operation>> {
        self.operations.iter().find(|op| op.name() == name)
    }

    /// Declared operation names, in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.operations.iter().map(|op| op.name()).collect()
    }

    /// Iterate over registered operations.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Operation>> {
        self.operations.iter()
    }

    /// Validate and run an operation. `None` when the name is unknown.
    pub fn invoke(&self, name: &str, args: Option<&Value>) -> Option<OperationResult> {
        let op = self.get(name)?;
        Some(run(op.as_ref(), args))
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn run(op: &dyn Operation, args: Option<&Value>) -> OperationResult {
    let label = op.label();
    let (outcome, inputs) = match validate(op.params(), args) {
        Ok(valid) => (op.compute(&valid.values), valid.inputs),
        Err(rejected) => (
            Err(OperationError::InvalidArguments(rejected.reason)),
            rejected.inputs,
        ),
    };

    match outcome {
        Ok(result) => {
            counter!(OPERATIONS_TOTAL, "operation" => op.name(), "outcome" => "success")
                .increment(1);
            info!(operation = label, ?inputs, result, "operation completed");
            OperationResult::Success(SuccessPayload {
                result: number_value(result),
                operation: label,
                inputs,
                timestamp: abacus_core::timestamp(),
            })
        }
        Err(err) => {
            counter!(OPERATIONS_TOTAL, "operation" => op.name(), "outcome" => "failure")
                .increment(1);
            warn!(operation = label, ?inputs, error = %err, "operation failed");
            OperationResult::Failure(FailurePayload {
                error: err.to_string(),
                operation: label,
                inputs,
                timestamp: abacus_core::timestamp(),
            })
        }
    }
}
