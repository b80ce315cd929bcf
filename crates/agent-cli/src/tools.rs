//! Example Tools
//!
//! The assistant's built-in capabilities. `dangerous_operation` blocks on the
//! confirmation gate before it does anything.

use std::sync::Arc;

use agent_core::tool::{ParameterSchema, Tool, ToolCall, ToolResult, ToolSchema};
use agent_core::Result;
use agent_runtime::{ConfirmationGate, OutputSink};
use async_trait::async_trait;
use serde_json::json;

/// Canned weather lookup
pub struct WeatherTool;

impl WeatherTool {
    fn conditions(city: &str) -> (&'static str, &'static str, &'static str) {
        match city.trim().to_lowercase().as_str() {
            "tokyo" => ("22°C", "Sunny", "45%"),
            "london" => ("14°C", "Cloudy", "78%"),
            "new york" => ("18°C", "Partly cloudy", "55%"),
            _ => ("20°C", "Clear", "50%"),
        }
    }
}

#[async_trait]
impl Tool for WeatherTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_weather".into(),
            label: "Get Weather".into(),
            description: "Get current weather for a city. Use when the user asks about weather."
                .into(),
            parameters: vec![ParameterSchema::string(
                "city",
                "City name (e.g. \"Tokyo\", \"London\")",
            )],
            requires_confirmation: false,
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        let city = call.str_arg("city").unwrap_or_default();
        let (temp, condition, humidity) = Self::conditions(city);
        let report = json!({
            "city": city,
            "temp": temp,
            "condition": condition,
            "humidity": humidity,
        });
        Ok(ToolResult::success("get_weather", report.to_string()).with_data(report))
    }
}

/// Simulated destructive action that needs the user's approval
pub struct DangerousOperationTool {
    gate: ConfirmationGate,
    sink: Arc<dyn OutputSink>,
}

impl DangerousOperationTool {
    pub fn new(gate: ConfirmationGate, sink: Arc<dyn OutputSink>) -> Self {
        Self { gate, sink }
    }
}

#[async_trait]
impl Tool for DangerousOperationTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "dangerous_operation".into(),
            label: "Dangerous Operation".into(),
            description: "Perform a potentially dangerous operation (e.g. delete a file, run a \
                          destructive command). Requires user confirmation."
                .into(),
            parameters: vec![
                ParameterSchema::string("operation", "Description of the operation to perform"),
                ParameterSchema::string("reason", "Why this operation is needed"),
            ],
            requires_confirmation: true,
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        let operation = call.str_arg("operation").unwrap_or_default();
        let reason = call.str_arg("reason").unwrap_or_default();

        self.sink.line("\n⚠️  Dangerous operation requested:");
        self.sink.line(&format!("   Operation: {operation}"));
        self.sink.line(&format!("   Reason: {reason}"));
        self.sink.line("   Confirm? [y/N]");

        let decision = match self.gate.wait_for_confirmation().await {
            Ok(decision) => decision,
            Err(e) => return Ok(ToolResult::failure("dangerous_operation", e.to_string())),
        };

        if !decision.confirmed {
            self.sink.line("   ❌ Cancelled by user\n");
            return Ok(ToolResult::success(
                "dangerous_operation",
                "User cancelled the operation.",
            ));
        }

        self.sink.line("   ✅ Executed (simulated)\n");
        Ok(ToolResult::success(
            "dangerous_operation",
            format!("Operation completed: {operation}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_runtime::MemorySink;

    fn dangerous_call() -> ToolCall {
        ToolCall::new("dangerous_operation")
            .with_arg("operation", json!("rm -rf build/"))
            .with_arg("reason", json!("clean rebuild"))
    }

    async fn run_pending(
        tool: DangerousOperationTool,
        gate: &ConfirmationGate,
    ) -> tokio::task::JoinHandle<Result<ToolResult>> {
        let handle = tokio::spawn(async move { tool.execute(&dangerous_call()).await });
        while !gate.is_pending() {
            tokio::task::yield_now().await;
        }
        handle
    }

    #[tokio::test]
    async fn test_weather_known_and_default_city() {
        let tokyo = WeatherTool
            .execute(&ToolCall::new("get_weather").with_arg("city", json!("Tokyo")))
            .await
            .unwrap();
        let data = tokyo.data.unwrap();
        assert_eq!(data["city"], "Tokyo");
        assert_eq!(data["temp"], "22°C");

        let elsewhere = WeatherTool
            .execute(&ToolCall::new("get_weather").with_arg("city", json!("Lima")))
            .await
            .unwrap();
        let report: serde_json::Value = serde_json::from_str(&elsewhere.output).unwrap();
        assert_eq!(report["condition"], "Clear");
        assert_eq!(report["humidity"], "50%");
    }

    #[tokio::test]
    async fn test_confirmed_operation_runs() {
        let gate = ConfirmationGate::new();
        let sink = Arc::new(MemorySink::new());
        let tool = DangerousOperationTool::new(gate.clone(), sink.clone());

        let handle = run_pending(tool, &gate).await;
        assert!(sink.contents().contains("Operation: rm -rf build/"));
        gate.answer("yes");

        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.output, "Operation completed: rm -rf build/");
        assert!(sink.contents().contains("Executed (simulated)"));
    }

    #[tokio::test]
    async fn test_declined_operation_is_cancelled() {
        let gate = ConfirmationGate::new();
        let sink = Arc::new(MemorySink::new());
        let tool = DangerousOperationTool::new(gate.clone(), sink.clone());

        let handle = run_pending(tool, &gate).await;
        gate.answer("nope");

        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.output, "User cancelled the operation.");
        assert!(sink.contents().contains("Cancelled by user"));
    }

    #[tokio::test]
    async fn test_busy_gate_fails_the_call() {
        let gate = ConfirmationGate::new();
        let sink = Arc::new(MemorySink::new());
        let first = run_pending(DangerousOperationTool::new(gate.clone(), sink.clone()), &gate).await;

        let second = DangerousOperationTool::new(gate.clone(), sink.clone())
            .execute(&dangerous_call())
            .await
            .unwrap();
        assert!(!second.success);

        gate.cancel();
        assert!(first.await.unwrap().unwrap().success);
    }
}
