//! Argument validation for operations.
//!
//! Every declared parameter must be present and a JSON number. Unknown
//! extra keys are ignored.

use serde_json::{Map, Value};

use super::{Param, number_value};

/// Arguments that passed validation.
#[derive(Clone, Debug, PartialEq)]
pub struct Validated {
    /// Values in declared parameter order.
    pub values: Vec<f64>,
    /// Echo of the inputs for result payloads.
    pub inputs: Map<String, Value>,
}

/// Arguments that failed validation.
#[derive(Clone, Debug, PartialEq)]
pub struct Rejected {
    /// Every problem found, joined with `; `.
    pub reason: String,
    /// Numeric arguments that did parse (best effort).
    pub inputs: Map<String, Value>,
}

/// Validate `args` against `params`.
pub fn validate(params: &[Param], args: Option<&Value>) -> Result<Validated, Rejected> {
    let empty = Map::new();
    let map = match args {
        Some(Value::Object(map)) => map,
        None | Some(Value::Null) => &empty,
        Some(_) => {
            return Err(Rejected {
                reason: "arguments must be an object".into(),
                inputs: Map::new(),
            });
        }
    };

    let mut values = Vec::with_capacity(params.len());
    let mut inputs = Map::new();
    let mut problems = Vec::new();

    for param in params {
        match map.get(param.name) {
            None => problems.push(format!("'{}' is required", param.name)),
            Some(v) => match v.as_f64() {
                Some(n) => {
                    values.push(n);
                    let _ = inputs.insert(param.name.to_string(), number_value(n));
                }
                None => problems.push(format!("'{}' must be a number", param.name)),
            },
        }
    }

    if problems.is_empty() {
        Ok(Validated { values, inputs })
    } else {
        Err(Rejected {
            reason: problems.join("; "),
            inputs,
        })
    }
}
