//! OpenAI-compatible HTTP client for the generation service.
//!
//! Works against any chat-completions endpoint (OpenAI, Ollama, local
//! servers). Responses are requested as JSON and normalized here so the
//! rest of the pipeline never touches raw service output.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::ServiceError;
use crate::segment::{Chunk, QaPair};
use crate::tree::Node;

use super::{GenerationService, MapElement, MappingPair};

const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct HttpServiceConfig {
    /// Base URL including the API version segment, e.g.
    /// `http://localhost:11434/v1`.
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl HttpServiceConfig {
    pub fn new(endpoint: String, model: String, api_key: Option<String>) -> Self {
        Self {
            endpoint,
            model,
            api_key,
            connect_timeout: HTTP_CONNECT_TIMEOUT,
            request_timeout: HTTP_REQUEST_TIMEOUT,
        }
    }
}

pub struct HttpGenerationService {
    client: Client,
    config: HttpServiceConfig,
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

fn map_http_error(error: reqwest::Error) -> ServiceError {
    if error.is_timeout() {
        ServiceError::RequestFailed(format!("request timeout: {error}"))
    } else if error.is_connect() {
        ServiceError::RequestFailed(format!("connection error: {error}"))
    } else {
        ServiceError::Other(format!("http error: {error}"))
    }
}

impl HttpGenerationService {
    pub fn new(config: HttpServiceConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .no_proxy()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ServiceError::Other(format!("failed to create http client: {e}")))?;
        Ok(Self { client, config })
    }

    async fn complete(&self, system: &str, user: String) -> Result<String, ServiceError> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user,
                },
            ],
            temperature: 0.2,
            stream: false,
        };

        let url = format!("{}/chat/completions", self.config.endpoint);
        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder.send().await.map_err(map_http_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(match status.as_u16() {
                401 => ServiceError::AuthFailed(error_text),
                404 => ServiceError::ModelNotFound(error_text),
                429 => ServiceError::RateLimited(error_text),
                _ => ServiceError::RequestFailed(format!("status {status}: {error_text}")),
            });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::MalformedResponse(format!("bad completion body: {e}")))?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::MalformedResponse("no choices in response".into()))?;
        Ok(choice.message.content)
    }

    /// Parse a model reply as JSON, tolerating a markdown code fence.
    fn parse_json(content: &str) -> Result<Value, ServiceError> {
        let trimmed = content.trim();
        let body = trimmed
            .strip_prefix("```json")
            .or_else(|| trimmed.strip_prefix("```"))
            .and_then(|s| s.strip_suffix("```"))
            .unwrap_or(trimmed)
            .trim();
        serde_json::from_str(body)
            .map_err(|e| ServiceError::MalformedResponse(format!("invalid json: {e}")))
    }
}

const SUMMARIZE_SYSTEM: &str = "You turn a markdown fragment into a compact outline. \
Reply with JSON: {\"tree\": {\"title\": ..., \"children\": [...]}, \"tags\": [...]}. \
Tags are 3-6 short topical labels.";

const MERGE_SYSTEM: &str = "You merge two partial outlines into one coherent outline, \
combining overlapping branches and keeping all distinct topics. \
Reply with JSON: {\"title\": ..., \"children\": [...]}.";

const REFINE_SYSTEM: &str = "You restructure an outline: deduplicate near-identical \
branches, group related topics, keep titles short. \
Reply with JSON: {\"title\": ..., \"children\": [...]}.";

const MAP_SYSTEM: &str = "You assign content elements to outline nodes. For each \
element pick the single best node. Reply with JSON: \
{\"mappings\": [{\"element_id\": ..., \"target_node_id\": ...}]}. \
Omit elements that fit nowhere.";

const QUESTIONS_SYSTEM: &str = "You write study questions answerable from the given \
markdown fragment. Reply with JSON: {\"questions\": [...]}.";

const ANSWERS_SYSTEM: &str = "You answer questions from the given markdown fragment. \
Each block is prefixed with its element id. Reply with JSON: {\"answers\": \
[{\"element_id\": ..., \"question\": ..., \"answer\": ...}]} where element_id names \
the block that grounds the answer.";

/// Tree description sent alongside mapping requests: id and title per node,
/// indented by depth.
fn tree_outline(node: &Node, depth: usize, out: &mut String) {
    let id = node.node_id.as_deref().unwrap_or("-");
    out.push_str(&format!("{}{} [{}]\n", "  ".repeat(depth), node.title, id));
    for child in &node.children {
        tree_outline(child, depth + 1, out);
    }
}

fn chunk_with_ids(chunk: &Chunk) -> String {
    chunk
        .blocks
        .iter()
        .map(|b| format!("[{}]\n{}", b.element_id, b.markdown()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl GenerationService for HttpGenerationService {
    async fn summarize_chunk(&self, chunk: &Chunk) -> Result<(Node, Vec<String>), ServiceError> {
        let content = self.complete(SUMMARIZE_SYSTEM, chunk.markdown()).await?;
        let value = Self::parse_json(&content)?;

        let tree_value = value.get("tree").unwrap_or(&value);
        let tree = Node::normalize(tree_value);
        if tree.is_empty() {
            return Err(ServiceError::MalformedResponse(
                "summary tree is empty".into(),
            ));
        }
        let tags = value
            .get("tags")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok((tree, tags))
    }

    async fn merge_trees(&self, left: &Node, right: &Node) -> Result<Node, ServiceError> {
        let payload = json!({ "left": left, "right": right }).to_string();
        let content = self.complete(MERGE_SYSTEM, payload).await?;
        let tree = Node::normalize(&Self::parse_json(&content)?);
        if tree.is_empty() {
            return Err(ServiceError::MalformedResponse("merged tree is empty".into()));
        }
        Ok(tree)
    }

    async fn refine_tree(&self, tree: &Node) -> Result<Node, ServiceError> {
        let payload = serde_json::to_string(tree)
            .map_err(|e| ServiceError::Other(format!("serialize tree: {e}")))?;
        let content = self.complete(REFINE_SYSTEM, payload).await?;
        let refined = Node::normalize(&Self::parse_json(&content)?);
        if refined.is_empty() {
            return Err(ServiceError::MalformedResponse(
                "refined tree is empty".into(),
            ));
        }
        Ok(refined)
    }

    async fn map_elements(
        &self,
        tree: &Node,
        elements: &[MapElement],
    ) -> Result<Vec<MappingPair>, ServiceError> {
        let mut outline = String::new();
        tree_outline(tree, 0, &mut outline);
        let payload = json!({ "outline": outline, "elements": elements }).to_string();
        let content = self.complete(MAP_SYSTEM, payload).await?;
        let value = Self::parse_json(&content)?;

        let rows = value
            .get("mappings")
            .and_then(Value::as_array)
            .or_else(|| value.as_array())
            .ok_or_else(|| ServiceError::MalformedResponse("no mappings array".into()))?;

        // Rows missing either field are dropped here, not propagated.
        let mut pairs = Vec::with_capacity(rows.len());
        for row in rows {
            let element_id = row.get("element_id").and_then(Value::as_str);
            let target = row.get("target_node_id").and_then(Value::as_str);
            match (element_id, target) {
                (Some(e), Some(n)) if !e.is_empty() && !n.is_empty() => pairs.push(MappingPair {
                    element_id: e.to_string(),
                    target_node_id: n.to_string(),
                }),
                _ => warn!(?row, "dropping malformed mapping row"),
            }
        }
        debug!(
            requested = elements.len(),
            returned = pairs.len(),
            "mapping batch complete"
        );
        Ok(pairs)
    }

    async fn generate_questions(&self, chunk: &Chunk) -> Result<Vec<String>, ServiceError> {
        let content = self.complete(QUESTIONS_SYSTEM, chunk.markdown()).await?;
        let value = Self::parse_json(&content)?;
        let questions = value
            .get("questions")
            .and_then(Value::as_array)
            .or_else(|| value.as_array())
            .ok_or_else(|| ServiceError::MalformedResponse("no questions array".into()))?;
        Ok(questions
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect())
    }

    async fn answer_questions(
        &self,
        chunk: &Chunk,
        questions: &[String],
    ) -> Result<Vec<QaPair>, ServiceError> {
        let payload = json!({
            "fragment": chunk_with_ids(chunk),
            "questions": questions,
        })
        .to_string();
        let content = self.complete(ANSWERS_SYSTEM, payload).await?;
        let value = Self::parse_json(&content)?;
        let rows = value
            .get("answers")
            .and_then(Value::as_array)
            .or_else(|| value.as_array())
            .ok_or_else(|| ServiceError::MalformedResponse("no answers array".into()))?;

        let mut pairs = Vec::with_capacity(rows.len());
        for row in rows {
            let element_id = row.get("element_id").and_then(Value::as_str);
            let question = row.get("question").and_then(Value::as_str);
            let answer = row.get("answer").and_then(Value::as_str);
            match (element_id, question, answer) {
                (Some(e), Some(q), Some(a)) if !a.is_empty() => pairs.push(QaPair {
                    element_id: e.to_string(),
                    question: q.to_string(),
                    answer: a.to_string(),
                }),
                _ => warn!(?row, "dropping malformed answer row"),
            }
        }
        Ok(pairs)
    }
}
