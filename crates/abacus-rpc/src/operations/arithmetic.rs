//! The six arithmetic operations.

use super::{Operation, OperationError, OperationRegistry, Param};

/// Register every arithmetic operation.
pub fn register_all(registry: &mut OperationRegistry) {
    registry.register(Add);
    registry.register(Subtract);
    registry.register(Multiply);
    registry.register(Divide);
    registry.register(Power);
    registry.register(SquareRoot);
}

fn pair(values: &[f64]) -> Result<(f64, f64), OperationError> {
    match values {
        [a, b] => Ok((*a, *b)),
        _ => Err(OperationError::InvalidArguments(format!(
            "expected 2 arguments, got {}",
            values.len()
        ))),
    }
}

fn finite(result: f64) -> Result<f64, OperationError> {
    if result.is_finite() {
        Ok(result)
    } else {
        Err(OperationError::NonFinite)
    }
}

/// `a + b`.
pub struct Add;

impl Operation for Add {
    fn name(&self) -> &'static str {
        "add"
    }
    fn label(&self) -> &'static str {
        "addition"
    }
    fn title(&self) -> &'static str {
        "Addition Calculator"
    }
    fn description(&self) -> &'static str {
        "Add two numbers together and return the result"
    }
    fn params(&self) -> &'static [Param] {
        &[
            Param {
                name: "a",
                description: "First number to add",
            },
            Param {
                name: "b",
                description: "Second number to add",
            },
        ]
    }
    fn compute(&self, values: &[f64]) -> Result<f64, OperationError> {
        let (a, b) = pair(values)?;
        Ok(a + b)
    }
}

/// `a - b`.
pub struct Subtract;

impl Operation for Subtract {
    fn name(&self) -> &'static str {
        "subtract"
    }
    fn label(&self) -> &'static str {
        "subtraction"
    }
    fn title(&self) -> &'static str {
        "Subtraction Calculator"
    }
    fn description(&self) -> &'static str {
        "Subtract the second number from the first number"
    }
    fn params(&self) -> &'static [Param] {
        &[
            Param {
                name: "a",
                description: "Number to subtract from",
            },
            Param {
                name: "b",
                description: "Number to subtract",
            },
        ]
    }
    fn compute(&self, values: &[f64]) -> Result<f64, OperationError> {
        let (a, b) = pair(values)?;
        Ok(a - b)
    }
}

/// `a * b`.
pub struct Multiply;

impl Operation for Multiply {
    fn name(&self) -> &'static str {
        "multiply"
    }
    fn label(&self) -> &'static str {
        "multiplication"
    }
    fn title(&self) -> &'static str {
        "Multiplication Calculator"
    }
    fn description(&self) -> &'static str {
        "Multiply two numbers together"
    }
    fn params(&self) -> &'static [Param] {
        &[
            Param {
                name: "a",
                description: "First number to multiply",
            },
            Param {
                name: "b",
                description: "Second number to multiply",
            },
        ]
    }
    fn compute(&self, values: &[f64]) -> Result<f64, OperationError> {
        let (a, b) = pair(values)?;
        Ok(a * b)
    }
}

/// `a / b`, rejecting a zero divisor.
pub struct Divide;

impl Operation for Divide {
    fn name(&self) -> &'static str {
        "divide"
    }
    fn label(&self) -> &'static str {
        "division"
    }
    fn title(&self) -> &'static str {
        "Division Calculator"
    }
    fn description(&self) -> &'static str {
        "Divide the first number by the second number"
    }
    fn params(&self) -> &'static [Param] {
        &[
            Param {
                name: "a",
                description: "Dividend",
            },
            Param {
                name: "b",
                description: "Divisor (cannot be zero)",
            },
        ]
    }
    fn compute(&self, values: &[f64]) -> Result<f64, OperationError> {
        let (a, b) = pair(values)?;
        if b == 0.0 {
            return Err(OperationError::DivisionByZero);
        }
        Ok(a / b)
    }
}

/// `base ^ exponent`, rejecting non-finite results.
pub struct Power;

impl Operation for Power {
    fn name(&self) -> &'static str {
        "power"
    }
    fn label(&self) -> &'static str {
        "power"
    }
    fn title(&self) -> &'static str {
        "Power Calculator"
    }
    fn description(&self) -> &'static str {
        "Raise the base number to the power of the exponent"
    }
    fn params(&self) -> &'static [Param] {
        &[
            Param {
                name: "base",
                description: "Base number",
            },
            Param {
                name: "exponent",
                description: "Exponent",
            },
        ]
    }
    fn compute(&self, values: &[f64]) -> Result<f64, OperationError> {
        let (base, exponent) = pair(values)?;
        finite(base.powf(exponent))
    }
}

/// Square root; negative input is rejected at compute time.
pub struct SquareRoot;

impl Operation for SquareRoot {
    fn name(&self) -> &'static str {
        "sqrt"
    }
    fn label(&self) -> &'static str {
        "square_root"
    }
    fn title(&self) -> &'static str {
        "Square Root Calculator"
    }
    fn description(&self) -> &'static str {
        "Calculate the square root of a number"
    }
    fn params(&self) -> &'static [Param] {
        &[Param {
            name: "value",
            description: "Number to calculate square root (must be non-negative)",
        }]
    }
    fn compute(&self, values: &[f64]) -> Result<f64, OperationError> {
        let [value] = values else {
            return Err(OperationError::InvalidArguments(format!(
                "expected 1 argument, got {}",
                values.len()
            )));
        };
        if *value < 0.0 {
            return Err(OperationError::NegativeSquareRoot);
        }
        Ok(value.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn basic_arithmetic() {
        assert_eq!(Add.compute(&[15.0, 25.0]), Ok(40.0));
        assert_eq!(Subtract.compute(&[10.0, 4.0]), Ok(6.0));
        assert_eq!(Multiply.compute(&[6.0, 7.0]), Ok(42.0));
        assert_eq!(Divide.compute(&[10.0, 4.0]), Ok(2.5));
        assert_eq!(Power.compute(&[2.0, 10.0]), Ok(1024.0));
        assert_eq!(SquareRoot.compute(&[16.0]), Ok(4.0));
    }

    #[test]
    fn divide_by_negative_zero() {
        assert_eq!(
            Divide.compute(&[1.0, -0.0]),
            Err(OperationError::DivisionByZero)
        );
    }

    #[test]
    fn power_overflow_is_non_finite() {
        assert_eq!(
            Power.compute(&[2.0, 1024.0]),
            Err(OperationError::NonFinite)
        );
    }

    #[test]
    fn power_nan_is_non_finite() {
        assert_eq!(
            Power.compute(&[-8.0, 1.0 / 3.0]),
            Err(OperationError::NonFinite)
        );
    }

    #[test]
    fn sqrt_of_zero() {
        assert_eq!(SquareRoot.compute(&[0.0]), Ok(0.0));
    }

    #[test]
    fn wrong_arity_is_invalid() {
        assert!(matches!(
            Add.compute(&[1.0]),
            Err(OperationError::InvalidArguments(_))
        ));
        assert!(matches!(
            SquareRoot.compute(&[]),
            Err(OperationError::InvalidArguments(_))
        ));
    }

    #[test]
    fn failure_messages() {
        assert_eq!(
            OperationError::DivisionByZero.to_string(),
            "Division by zero is not allowed"
        );
        assert_eq!(
            OperationError::NonFinite.to_string(),
            "Result is infinite or not a number"
        );
        assert_eq!(
            OperationError::NegativeSquareRoot.to_string(),
            "Cannot calculate square root of a negative number"
        );
    }

    proptest! {
        #[test]
        fn division_by_zero_always_fails(a in proptest::num::f64::NORMAL) {
            prop_assert_eq!(Divide.compute(&[a, 0.0]), Err(OperationError::DivisionByZero));
        }

        #[test]
        fn negative_sqrt_always_fails(v in -1e300f64..-1e-300) {
            prop_assert_eq!(SquareRoot.compute(&[v]), Err(OperationError::NegativeSquareRoot));
        }

        #[test]
        fn finite_power_results_are_finite(base in -100f64..100.0, exp in -10f64..10.0) {
            if let Ok(r) = Power.compute(&[base, exp]) {
                prop_assert!(r.is_finite());
            }
        }
    }
}
