pub mod client;
pub mod tokens;

pub use client::{HttpClient, HttpResponse};
pub use tokens::{extract_jwt_tokens, TokenJar};
