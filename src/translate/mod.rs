//! API translation between the generate-content schema and `OpenAI` chat completions.
//!
//! The core of the bridge: converts requests, responses, and streaming chunks
//! between the two API formats. All translation functions are pure (no I/O).

pub mod gemini_types;
pub mod openai_types;
pub mod request;
pub mod response;
pub mod streaming;
