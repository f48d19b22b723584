//! External collaborators: the content generator and the content extractor
//!
//! Both are opaque services. The generator proposes graph deltas from an
//! instruction; the extractor turns uploaded bytes into plain text.
//! Implementations:
//! - `CommandGenerator`: spawns a configured program, request JSON on stdin,
//!   response text on stdout
//! - `PlainTextExtractor`: decodes text uploads in-process
//! - `MockGenerator` / `MockExtractor`: scripted responses (testing)

use crate::assembler::AssembledGraph;
use crate::merge::extract_json;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Errors from external collaborators.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExternalError {
    #[error("service not available: {0}")]
    Unavailable(String),
    #[error("call failed: {0}")]
    Failed(String),
    #[error("{service} timed out after {seconds}s")]
    Timeout { service: &'static str, seconds: u64 },
    #[error("unsupported content type: {0}")]
    Unsupported(String),
}

/// What the generator is asked to do
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub instruction: String,
    /// Current state of the graph being refined, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_graph: Option<AssembledGraph>,
}

impl GenerationRequest {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            previous_graph: None,
        }
    }

    pub fn with_previous(mut self, graph: AssembledGraph) -> Self {
        self.previous_graph = Some(graph);
        self
    }
}

/// Proposes `{nodes, edges}` deltas.
///
/// Output is untrusted: it may be malformed or incomplete and is validated
/// by the caller.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value, ExternalError>;
}

/// Turns uploaded bytes into plain text
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(&self, bytes: &[u8], mime_hint: &str) -> Result<String, ExternalError>;
}

/// Run an external call under a deadline
pub async fn with_deadline<T, F>(
    service: &'static str,
    limit: Duration,
    call: F,
) -> Result<T, ExternalError>
where
    F: std::future::Future<Output = Result<T, ExternalError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ExternalError::Timeout {
            service,
            seconds: limit.as_secs(),
        }),
    }
}

// --- Command-backed generator ---

/// Generator backed by an external program.
///
/// The request is written to the program's stdin as JSON; its stdout is
/// searched for a JSON object (fenced or surrounded by prose is fine).
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
}

impl CommandGenerator {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl ContentGenerator for CommandGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value, ExternalError> {
        let payload =
            serde_json::to_vec(request).map_err(|e| ExternalError::Failed(e.to_string()))?;

        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExternalError::Unavailable(format!("{}: {}", self.program, e)))?;

        // Feed stdin while draining stdout so neither pipe can fill up
        let stdin = child.stdin.take();
        let write = async move {
            match stdin {
                Some(mut stdin) => stdin.write_all(&payload).await,
                None => Ok(()),
            }
        };
        let (written, output) = tokio::join!(write, child.wait_with_output());
        let output = output.map_err(|e| ExternalError::Failed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExternalError::Failed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        // A child may answer without reading the whole request
        if let Err(e) = written {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(ExternalError::Failed(e.to_string()));
            }
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        tracing::debug!(program = %self.program, bytes = text.len(), "generator responded");
        // Non-JSON output is handed on as text and rejected by validation
        Ok(extract_json(&text).unwrap_or(Value::String(text)))
    }
}

// --- In-process extractor ---

/// Extractor for text uploads (`text/*`, `.txt`, `.md`, JSON)
#[derive(Debug, Clone, Default)]
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    fn accepts(mime_hint: &str) -> bool {
        let hint = mime_hint.trim().to_ascii_lowercase();
        hint.starts_with("text/")
            || hint == "application/json"
            || hint.ends_with(".txt")
            || hint.ends_with(".md")
            || hint == "txt"
            || hint == "md"
    }
}

#[async_trait]
impl ContentExtractor for PlainTextExtractor {
    async fn extract(&self, bytes: &[u8], mime_hint: &str) -> Result<String, ExternalError> {
        if !Self::accepts(mime_hint) {
            return Err(ExternalError::Unsupported(mime_hint.to_string()));
        }
        String::from_utf8(bytes.to_vec())
            .map_err(|e| ExternalError::Failed(format!("invalid UTF-8: {}", e)))
    }
}

// --- Mocks ---

/// Mock generator for testing: replays scripted responses in order.
pub struct MockGenerator {
    available: bool,
    responses: Mutex<VecDeque<Result<Value, ExternalError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
    delay: Option<Duration>,
}

impl MockGenerator {
    /// Create a mock generator that reports as available.
    pub fn available() -> Self {
        Self {
            available: true,
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Create a mock generator that reports as unavailable.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::available()
        }
    }

    /// Queue a response
    pub fn with_response(mut self, response: Value) -> Self {
        self.responses.get_mut().push_back(Ok(response));
        self
    }

    /// Queue a failure
    pub fn with_failure(mut self, error: ExternalError) -> Self {
        self.responses.get_mut().push_back(Err(error));
        self
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Requests received so far
    pub async fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl ContentGenerator for MockGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value, ExternalError> {
        self.requests.lock().await.push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if !self.available {
            return Err(ExternalError::Unavailable(
                "mock generator configured as unavailable".to_string(),
            ));
        }
        self.responses.lock().await.pop_front().unwrap_or_else(|| {
            Err(ExternalError::Failed(
                "no scripted response left".to_string(),
            ))
        })
    }
}

/// Mock extractor for testing: returns a fixed text or failure.
pub struct MockExtractor {
    result: Result<String, ExternalError>,
}

impl MockExtractor {
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            result: Ok(text.into()),
        }
    }

    pub fn with_failure(error: ExternalError) -> Self {
        Self { result: Err(error) }
    }
}

#[async_trait]
impl ContentExtractor for MockExtractor {
    async fn extract(&self, _bytes: &[u8], _mime_hint: &str) -> Result<String, ExternalError> {
        self.result.clone()
    }
}
