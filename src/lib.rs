pub mod config;
pub mod crawler;
pub mod errors;
pub mod extraction;
pub mod graph;
pub mod mutation;
pub mod parse;
pub mod resolution;
pub mod soql;
pub mod types;
