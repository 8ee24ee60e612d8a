pub mod app;
pub mod cancel;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod extractor;
pub mod geo;
pub mod human;
pub mod output;
pub mod progress;
pub mod resolver;
pub mod retry;
pub mod status;
pub mod transfer;
