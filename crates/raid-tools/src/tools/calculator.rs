//! Calculator tool — arithmetic expression evaluation

use crate::registry::{Tool, ToolParameter, ToolResult};
use serde_json::Value;

pub struct CalculatorTool;

impl CalculatorTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CalculatorTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Perform mathematical calculations with basic arithmetic operations (+, -, *, /, %, ^)"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::required(
            "expression",
            "string",
            "Mathematical expression to evaluate (e.g. '2 + 3 * 4')",
        )]
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let expression = match args["expression"].as_str() {
            Some(e) if !e.trim().is_empty() => e.trim(),
            _ => return ToolResult::error("no expression provided"),
        };

        // evalexpr uses ^ for exponentiation
        let prepared = expression.replace("**", "^");

        match evalexpr::eval(&prepared) {
            Ok(value) => match value.as_number() {
                Ok(n) if n.is_finite() => ToolResult::text(format!("Result: {}", n)),
                Ok(_) => ToolResult::error("division by zero"),
                Err(_) => ToolResult::error("result is not a number"),
            },
            Err(e) => ToolResult::error(format!("invalid mathematical expression - {}", e)),
        }
    }
}
