//! HTTP transfer layer for the OCR service: session negotiation, chunked
//! upload with per-request retry, and job control.

mod client;
mod request;
mod upload;

pub use client::OcrClient;
pub use request::{CORRELATION_HEADER, RetryPolicy};
pub use upload::ChunkPlan;
