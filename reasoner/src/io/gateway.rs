//! Model gateway abstraction.
//!
//! The [`ModelGateway`] trait decouples step orchestration from whatever
//! actually talks to a model provider. [`CommandGateway`] delegates each
//! query to an external command; tests use scripted gateways instead.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::io::process::run_command_with_timeout;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One query for a single reasoning step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: usize,
    pub temperature: f64,
    /// Time left in the run. Implementations must give up once it elapses.
    #[serde(skip)]
    pub timeout: Duration,
}

/// Gateway reply. `response` is either JSON text or already-structured JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayResponse {
    #[serde(default)]
    pub response: Option<Value>,
}

impl GatewayResponse {
    pub fn structured(value: Value) -> Self {
        Self {
            response: Some(value),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            response: Some(Value::String(text.into())),
        }
    }
}

/// Anything that can answer a step query.
///
/// Implementations must be shareable across concurrently running problems.
pub trait ModelGateway: Send + Sync {
    fn query(&self, request: &GatewayRequest) -> Result<GatewayResponse>;
}

/// Gateway that runs a command per query: request JSON on stdin, response JSON on stdout.
#[derive(Debug, Clone)]
pub struct CommandGateway {
    command: Vec<String>,
    output_limit_bytes: usize,
}

impl CommandGateway {
    pub fn new(command: Vec<String>, output_limit_bytes: usize) -> Result<Self> {
        if command.first().is_none_or(|program| program.trim().is_empty()) {
            return Err(anyhow!("gateway command must not be empty"));
        }
        Ok(Self {
            command,
            output_limit_bytes,
        })
    }
}

impl ModelGateway for CommandGateway {
    #[instrument(skip_all, fields(model = %request.model, timeout_ms = request.timeout.as_millis() as u64))]
    fn query(&self, request: &GatewayRequest) -> Result<GatewayResponse> {
        info!(program = %self.command[0], "querying model gateway");
        let payload = serde_json::to_vec(request).context("serialize gateway request")?;

        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..]);
        let output =
            run_command_with_timeout(cmd, Some(&payload), request.timeout, self.output_limit_bytes)
                .context("run gateway command")?;

        if output.timed_out {
            warn!("gateway command timed out");
            return Err(anyhow!("gateway timed out after {:?}", request.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "gateway command failed");
            return Err(anyhow!(
                "gateway failed with status {:?}: {}",
                output.status.code(),
                output.stderr_excerpt(400)
            ));
        }
        if output.stdout_truncated > 0 {
            return Err(anyhow!(
                "gateway response exceeded {} bytes",
                self.output_limit_bytes
            ));
        }

        let response: GatewayResponse = serde_json::from_slice(&output.stdout)
            .context("parse gateway response envelope")?;
        debug!(has_payload = response.response.is_some(), "gateway responded");
        Ok(response)
    }
}
