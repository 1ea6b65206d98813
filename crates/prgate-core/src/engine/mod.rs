pub mod orchestrator;
pub mod pipeline;

pub use orchestrator::{reverify, GateReport, Orchestrator, RunContext, RunPhase};
pub use pipeline::GatePipeline;
