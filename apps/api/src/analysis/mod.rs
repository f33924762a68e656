// Resume analysis: multipart intake, PDF text extraction, prompt assembly
// and the single model call. All model traffic goes through llm_client.

pub mod extract;
pub mod handlers;
pub mod pipeline;
pub mod prompts;
pub mod upload;
