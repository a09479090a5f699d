//! LLM 层：传输抽象与实现（Gemini / OpenAI 兼容 / Mock）+ 模型网关

pub mod gateway;
pub mod gemini;
pub mod mock;
pub mod openai;
pub mod traits;
pub mod types;

pub use gateway::{ModelAliases, ModelGateway, SamplingConfig, DEFAULT_MODEL};
pub use gemini::GeminiTransport;
pub use mock::ScriptedTransport;
pub use openai::OpenAiTransport;
pub use traits::{LlmError, ModelTransport, RetryConfig};
pub use types::{
    Content, FunctionCall, FunctionResponse, GenerateRequest, GroundingChunk, ModelTurn, Part,
    ResponseFormat, Role, ToolDeclaration, ToolSet,
};
