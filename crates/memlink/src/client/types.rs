//! Request types for the memory client
//!
//! The remote service owns its schema; these types only carry what the
//! client needs to build, measure, and split payloads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::config::ClientConfig;

/// A role/content record sent to the memory service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
    /// `part_i_of_k` when this record is one piece of a split message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_info: Option<String>,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            chunk_info: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

/// Content accepted by `add`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryInput {
    /// Raw text, sent as a single user message
    Text(String),
    Messages(Vec<Message>),
}

impl MemoryInput {
    /// The messages this input is sent as
    pub fn to_messages(&self) -> Vec<Message> {
        match self {
            MemoryInput::Text(text) => vec![Message::user(text.clone())],
            MemoryInput::Messages(messages) => messages.clone(),
        }
    }
}

impl From<String> for MemoryInput {
    fn from(text: String) -> Self {
        MemoryInput::Text(text)
    }
}

impl From<&str> for MemoryInput {
    fn from(text: &str) -> Self {
        MemoryInput::Text(text.to_string())
    }
}

impl From<Vec<Message>> for MemoryInput {
    fn from(messages: Vec<Message>) -> Self {
        MemoryInput::Messages(messages)
    }
}

/// API revision used for search and listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApiVersion {
    #[default]
    V1,
    V2,
}

impl ApiVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiVersion::V1 => "v1",
            ApiVersion::V2 => "v2",
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "v1" => Ok(ApiVersion::V1),
            "v2" => Ok(ApiVersion::V2),
            other => Err(format!("Unknown API version: {other}. Use v1 or v2.")),
        }
    }
}

/// Pass-through request parameters (`user_id`, `output_format`, paging, ...)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions(Map<String, Value>);

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter; `null` removes it
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        match value.into() {
            Value::Null => {
                self.0.remove(&key);
            }
            value => {
                self.0.insert(key, value);
            }
        }
    }

    pub fn user_id(self, user_id: impl Into<String>) -> Self {
        self.with("user_id", user_id.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Parameters as sent on the wire: nulls dropped, configured
    /// organization and project merged in unless already set.
    pub fn prepare(&self, client: &ClientConfig) -> Map<String, Value> {
        let mut params: Map<String, Value> = self
            .0
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        if let Some(org_id) = &client.org_id {
            params
                .entry("org_id")
                .or_insert_with(|| Value::String(org_id.clone()));
        }
        if let Some(project_id) = &client.project_id {
            params
                .entry("project_id")
                .or_insert_with(|| Value::String(project_id.clone()));
        }

        params
    }
}

impl From<Map<String, Value>> for RequestOptions {
    fn from(map: Map<String, Value>) -> Self {
        let mut options = Self::new();
        for (key, value) in map {
            options.set(key, value);
        }
        options
    }
}

/// Render parameters as query-string pairs
pub fn to_query(params: &Map<String, Value>) -> Vec<(String, String)> {
    params
        .iter()
        .map(|(k, v)| {
            let rendered = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), rendered)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_input_becomes_user_message() {
        let input = MemoryInput::from("remember this");
        assert_eq!(input.to_messages(), vec![Message::user("remember this")]);
    }

    #[test]
    fn test_message_serialization_skips_empty_chunk_info() {
        let value = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(value, json!({"role": "user", "content": "hi"}));

        let mut message = Message::user("hi");
        message.chunk_info = Some("part_1_of_2".to_string());
        let value = serde_json::to_value(message).unwrap();
        assert_eq!(value["chunk_info"], "part_1_of_2");
    }

    #[test]
    fn test_api_version_parsing() {
        assert_eq!("v1".parse::<ApiVersion>().unwrap(), ApiVersion::V1);
        assert_eq!("V2".parse::<ApiVersion>().unwrap(), ApiVersion::V2);
        assert!("v3".parse::<ApiVersion>().is_err());
        assert_eq!(ApiVersion::V2.to_string(), "v2");
    }

    #[test]
    fn test_prepare_merges_scope_and_drops_nulls() {
        let client = ClientConfig {
            org_id: Some("org-1".to_string()),
            project_id: Some("proj-1".to_string()),
            ..ClientConfig::default()
        };
        let options = RequestOptions::new()
            .user_id("alice")
            .with("project_id", "override")
            .with("agent_id", Value::Null);

        let params = options.prepare(&client);
        assert_eq!(params["user_id"], "alice");
        assert_eq!(params["org_id"], "org-1");
        assert_eq!(params["project_id"], "override");
        assert!(!params.contains_key("agent_id"));
    }

    #[test]
    fn test_to_query_renders_scalars() {
        let mut params = Map::new();
        params.insert("user_id".to_string(), json!("alice"));
        params.insert("page".to_string(), json!(2));
        params.insert("enable_graph".to_string(), json!(true));

        let query = to_query(&params);
        assert!(query.contains(&("user_id".to_string(), "alice".to_string())));
        assert!(query.contains(&("page".to_string(), "2".to_string())));
        assert!(query.contains(&("enable_graph".to_string(), "true".to_string())));
    }
}
