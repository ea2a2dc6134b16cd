pub mod aggregator;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod http_cache;
pub mod http_client;
pub mod importer;
pub mod orchestrator;
pub mod patch;
pub mod payload;
pub mod queries;
pub mod resolver;
pub mod riot_api;
