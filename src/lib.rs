//! Core of a multi-tenant content-generation service: the async job
//! orchestrator that accepts a request, dispatches it to an LLM/agent
//! pipeline, durably records artifacts, and streams progress to a
//! reconnecting client.

pub mod config;
pub mod errors;
pub mod kernel;

pub mod domains {
    pub mod audit;
    pub mod billing;
    pub mod content;
    pub mod media;
    pub mod plan;
    pub mod scheduler;
    pub mod tenant;
}

pub mod server;
