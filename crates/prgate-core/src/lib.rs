pub mod aggregate;
pub mod config;
pub mod engine;
pub mod errors;
pub mod model;
pub mod providers;
pub mod scenarios;
pub mod storage;

pub mod report;
