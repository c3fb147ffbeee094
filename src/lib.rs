pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http_client;
pub mod openai;
pub mod rate_limit;
pub mod retry;
pub mod routes;
pub mod scene;
pub mod url_validation;
