//! Small local tools: arithmetic, random numbers, and the clock.

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use toolwright_core::error::ToolError;
use toolwright_core::schema::{FieldKind, FieldSpec, ToolSchema};
use toolwright_core::tool::{Tool, parse_arguments};

/// Render a number the way people write it: integers without a trailing `.0`.
pub(crate) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

pub struct AdditionTool;

#[derive(Deserialize)]
struct AdditionArgs {
    a: f64,
    b: f64,
}

#[async_trait]
impl Tool for AdditionTool {
    fn name(&self) -> &str {
        "additionTool"
    }

    fn description(&self) -> &str {
        "Adds two numbers together."
    }

    fn input_schema(&self) -> ToolSchema {
        ToolSchema::new(vec![
            FieldSpec::required("a", FieldKind::Number, "The first number to add."),
            FieldSpec::required("b", FieldKind::Number, "The second number to add."),
        ])
    }

    async fn call(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let args: AdditionArgs = parse_arguments(self.name(), arguments)?;
        Ok(format_number(args.a + args.b))
    }
}

pub struct RandomNumberTool;

/// Largest integer every JSON consumer represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

#[derive(Deserialize)]
struct RandomArgs {
    min: f64,
    max: f64,
}

#[async_trait]
impl Tool for RandomNumberTool {
    fn name(&self) -> &str {
        "randomNumberTool"
    }

    fn description(&self) -> &str {
        "Generates a random number between the specified min and max values."
    }

    fn input_schema(&self) -> ToolSchema {
        ToolSchema::new(vec![
            FieldSpec::required("min", FieldKind::Integer, "The minimum value (inclusive).")
                .range(-MAX_SAFE_INTEGER, MAX_SAFE_INTEGER),
            FieldSpec::required("max", FieldKind::Integer, "The maximum value (inclusive).")
                .range(-MAX_SAFE_INTEGER, MAX_SAFE_INTEGER),
        ])
    }

    async fn call(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        // Integers may arrive as `5.0`, so go through f64
        let args: RandomArgs = parse_arguments(self.name(), arguments)?;
        let min = self.bound("min", args.min)?;
        let max = self.bound("max", args.max)?;
        if min > max {
            return Err(ToolError::failed(
                self.name(),
                "Invalid range: min must be less than or equal to max.",
            ));
        }
        let n = rand::rng().random_range(min..=max);
        Ok(n.to_string())
    }
}

impl RandomNumberTool {
    fn bound(&self, field: &str, value: f64) -> Result<i64, ToolError> {
        if value.fract() != 0.0 || value.abs() > MAX_SAFE_INTEGER {
            return Err(ToolError::failed(
                self.name(),
                format!("{field} must be a whole number between -{MAX_SAFE_INTEGER} and {MAX_SAFE_INTEGER}"),
            ));
        }
        Ok(value as i64)
    }
}

pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "currentTime"
    }

    fn description(&self) -> &str {
        "Returns the current local time in HH:MM:SS format."
    }

    fn input_schema(&self) -> ToolSchema {
        ToolSchema::empty()
    }

    async fn call(&self, _arguments: serde_json::Value) -> Result<String, ToolError> {
        Ok(chrono::Local::now().format("%H:%M:%S").to_string())
    }
}
