//! Structured-data extraction against the remote LLM API.

pub mod error;
pub mod http;
pub mod usage;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::document::InputFile;

pub use error::{is_cancellation_message, ExtractionError};
pub use http::{HttpExtractionClient, HttpExtractionConfig};
pub use usage::{ExtractionUsage, ModelPricing, PricingTable, TokenCounts};

/// Result of one successful extraction call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extraction {
    /// Raw extracted payload as returned by the API.
    pub data: serde_json::Value,
    pub usage: ExtractionUsage,
}

/// Performs a single file's extraction.
///
/// Implementations observe `cancel` cooperatively and return
/// [`ExtractionError::Cancelled`] when it fires.
#[async_trait]
pub trait ExtractionClient: Send + Sync {
    async fn extract(
        &self,
        file: &InputFile,
        cancel: &CancellationToken,
    ) -> Result<Extraction, ExtractionError>;

    /// Interactive single-file variant that reports text as it arrives.
    async fn extract_streaming(
        &self,
        file: &InputFile,
        cancel: &CancellationToken,
        on_text: &(dyn for<'a> Fn(&'a str) + Send + Sync),
    ) -> Result<Extraction, ExtractionError> {
        let extraction = self.extract(file, cancel).await?;
        match &extraction.data {
            serde_json::Value::String(text) => on_text(text),
            other => on_text(&other.to_string()),
        }
        Ok(extraction)
    }
}
