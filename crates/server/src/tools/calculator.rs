//! Calculator tool: basic arithmetic over f64 operands.

use axum::Json;
use serde::{Deserialize, Serialize};

use super::ToolError;

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Sqrt,
    Factorial,
}

impl Operation {
    fn arity(self) -> (usize, Option<usize>) {
        match self {
            Operation::Add | Operation::Multiply => (1, None),
            Operation::Subtract | Operation::Divide | Operation::Power => (2, Some(2)),
            Operation::Sqrt | Operation::Factorial => (1, Some(1)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CalculateRequest {
    pub operation: Operation,
    pub operands: Vec<f64>,
    /// Round the result to this many decimal places.
    #[serde(default)]
    pub precision: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct CalculateResponse {
    pub operation: Operation,
    pub operands: Vec<f64>,
    pub result: f64,
}

pub async fn calculate(
    Json(req): Json<CalculateRequest>,
) -> Result<Json<CalculateResponse>, ToolError> {
    let (min, max) = req.operation.arity();
    if req.operands.len() < min {
        return Err(ToolError::new(format!(
            "{:?} requires at least {min} operand(s)",
            req.operation
        )));
    }
    if let Some(max) = max
        && req.operands.len() > max
    {
        return Err(ToolError::new(format!(
            "{:?} takes exactly {max} operand(s)",
            req.operation
        )));
    }

    let mut result = apply(req.operation, &req.operands)?;
    if !result.is_finite() {
        return Err(ToolError::new("result is not a finite number"));
    }
    if let Some(precision) = req.precision {
        if precision > 15 {
            return Err(ToolError::new("precision must be at most 15"));
        }
        let factor = 10f64.powi(precision as i32);
        result = (result * factor).round() / factor;
    }

    Ok(Json(CalculateResponse {
        operation: req.operation,
        operands: req.operands,
        result,
    }))
}

fn apply(operation: Operation, operands: &[f64]) -> Result<f64, ToolError> {
    match operation {
        Operation::Add => Ok(operands.iter().sum()),
        Operation::Subtract => Ok(operands[0] - operands[1]),
        Operation::Multiply => Ok(operands.iter().product()),
        Operation::Divide => {
            if operands[1] == 0.0 {
                Err(ToolError::new("division by zero"))
            } else {
                Ok(operands[0] / operands[1])
            }
        }
        Operation::Power => Ok(operands[0].powf(operands[1])),
        Operation::Sqrt => {
            if operands[0] < 0.0 {
                Err(ToolError::new("square root of a negative number"))
            } else {
                Ok(operands[0].sqrt())
            }
        }
        Operation::Factorial => factorial(operands[0]),
    }
}

fn factorial(n: f64) -> Result<f64, ToolError> {
    if n < 0.0 || n.fract() != 0.0 {
        return Err(ToolError::new("factorial requires a non-negative integer"));
    }
    // 171! overflows f64.
    if n > 170.0 {
        return Err(ToolError::new("factorial operand too large (max 170)"));
    }
    let mut acc = 1.0f64;
    let mut i = 2.0f64;
    while i <= n {
        acc *= i;
        i += 1.0;
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(operation: Operation, operands: Vec<f64>) -> Result<f64, ToolError> {
        calculate(Json(CalculateRequest {
            operation,
            operands,
            precision: None,
        }))
        .await
        .map(|Json(res)| res.result)
    }

    #[tokio::test]
    async fn add_sums_all_operands() {
        assert_eq!(run(Operation::Add, vec![1.0, 2.0, 3.5]).await.expect("ok"), 6.5);
    }

    #[tokio::test]
    async fn subtract_takes_exactly_two() {
        assert_eq!(run(Operation::Subtract, vec![5.0, 3.0]).await.expect("ok"), 2.0);
        assert!(run(Operation::Subtract, vec![5.0, 3.0, 1.0]).await.is_err());
        assert!(run(Operation::Subtract, vec![5.0]).await.is_err());
    }

    #[tokio::test]
    async fn divide_by_zero_is_rejected() {
        let err = run(Operation::Divide, vec![1.0, 0.0]).await.expect_err("err");
        assert!(err.0.contains("zero"));
    }

    #[tokio::test]
    async fn negative_sqrt_is_rejected() {
        assert!(run(Operation::Sqrt, vec![-4.0]).await.is_err());
        assert_eq!(run(Operation::Sqrt, vec![9.0]).await.expect("ok"), 3.0);
    }

    #[tokio::test]
    async fn factorial_basics() {
        assert_eq!(run(Operation::Factorial, vec![0.0]).await.expect("ok"), 1.0);
        assert_eq!(run(Operation::Factorial, vec![5.0]).await.expect("ok"), 120.0);
        assert!(run(Operation::Factorial, vec![171.0]).await.is_err());
        assert!(run(Operation::Factorial, vec![2.5]).await.is_err());
    }

    #[tokio::test]
    async fn power() {
        assert_eq!(run(Operation::Power, vec![2.0, 10.0]).await.expect("ok"), 1024.0);
    }

    #[tokio::test]
    async fn precision_rounds_the_result() {
        let Json(res) = calculate(Json(CalculateRequest {
            operation: Operation::Divide,
            operands: vec![10.0, 3.0],
            precision: Some(2),
        }))
        .await
        .expect("ok");
        assert_eq!(res.result, 3.33);
    }

    #[tokio::test]
    async fn oversized_precision_is_rejected() {
        let result = calculate(Json(CalculateRequest {
            operation: Operation::Add,
            operands: vec![1.0, 2.0],
            precision: Some(40),
        }))
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn operation_names_deserialize_lowercase() {
        let req: CalculateRequest =
            serde_json::from_str(r#"{"operation": "multiply", "operands": [2, 3]}"#)
                .expect("parses");
        assert_eq!(req.operation, Operation::Multiply);
    }
}
