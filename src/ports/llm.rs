use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::Result;

/// Lazy, forward-only sequence of generated text increments.
pub type TextStream = BoxStream<'static, Result<String>>;

/// Language model used to answer from the assembled context.
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String>;

    /// Stream the answer. Increments arrive in the order the model produces them.
    async fn generate_stream(&self, prompt: &str, system_prompt: Option<&str>)
        -> Result<TextStream>;
}
