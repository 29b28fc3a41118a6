use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the content entry holding a raw request body.
pub const BODY_KEY: &str = "body";

/// An inference request payload, opaque to the serving core.
///
/// `properties` usually carry request headers, `content` the named data entries decoded by
/// the protocol layer (query parameters, form fields, the raw body).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub request_id: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub content: BTreeMap<String, Vec<u8>>,
}

impl Input {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            ..Default::default()
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.content.insert(key.into(), value.into());
        self
    }

    pub fn with_body(self, body: impl Into<Vec<u8>>) -> Self {
        self.with_data(BODY_KEY, body)
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn get_data(&self, key: &str) -> Option<&[u8]> {
        self.content.get(key).map(Vec::as_slice)
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.get_data(BODY_KEY)
    }
}

/// The result payload produced by an engine for one [`Input`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub request_id: String,
    pub code: u16,
    pub message: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub content: BTreeMap<String, Vec<u8>>,
}

impl Output {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            code: 200,
            message: "OK".to_string(),
            properties: BTreeMap::new(),
            content: BTreeMap::new(),
        }
    }

    /// An `Output` answering `input`, carrying over its request id.
    pub fn for_input(input: &Input) -> Self {
        Self::new(input.request_id.clone())
    }

    pub fn with_status(mut self, code: u16, message: impl Into<String>) -> Self {
        self.code = code;
        self.message = message.into();
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.content.insert(key.into(), value.into());
        self
    }

    pub fn with_body(self, body: impl Into<Vec<u8>>) -> Self {
        self.with_data(BODY_KEY, body)
    }

    pub fn get_data(&self, key: &str) -> Option<&[u8]> {
        self.content.get(key).map(Vec::as_slice)
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.get_data(BODY_KEY)
    }
}
