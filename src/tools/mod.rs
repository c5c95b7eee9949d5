//! Named external tools.
//!
//! A tool takes one structured parameter string and returns free text. User
//! errors (bad parameters, unsupported city) come back as `Ok` text so the
//! caller can show them verbatim; transport failures are `ApiError::Tool`.

mod weather;

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::ApiError;

pub use weather::{WeatherTool, CITY_CODES};

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Invoke with a single structured parameter string.
    async fn invoke(&self, input: &str) -> Result<String, ApiError>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub async fn invoke(&self, name: &str, input: &str) -> Result<String, ApiError> {
        match self.find(name) {
            Some(tool) => tool.invoke(input).await,
            None => Err(ApiError::Tool(format!("unknown tool: {}", name))),
        }
    }
}
