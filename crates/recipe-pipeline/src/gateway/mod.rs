pub mod llm;
pub mod retrieval;
pub mod websearch;

pub use llm::{ChatMessage, ChatRequest, ChatResponse, HttpLlmGateway, LlmGateway, NullLlmGateway, Role};
pub use retrieval::{HttpRetrievalGateway, NullRetrievalGateway, RetrievalGateway};
pub use websearch::{HttpWebSearchGateway, WebSearchGateway};
