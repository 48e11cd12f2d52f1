pub mod audit;
pub mod config;
pub mod llm;
pub mod models;
pub mod monitor;
pub mod ratelimit;
pub mod sanitize;
pub mod session;
