pub mod agent;
pub mod llm;
pub mod metadata;
