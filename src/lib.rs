pub mod agent;
pub mod chunk;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod gitlab;
pub mod models;
pub mod plan;
pub mod process;
pub mod prompts;
pub mod repo;
pub mod report;
pub mod review;
pub mod safety;
pub mod tools;
