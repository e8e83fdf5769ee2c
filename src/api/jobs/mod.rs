pub mod dto;
pub mod handlers;
pub mod models;
pub mod service;

// Re-export commonly used types
pub use models::{JobsConfig, PipelineRunRequest};
pub use service::{JobsService, ServiceError};
