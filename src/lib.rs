#![forbid(unsafe_code)]

pub mod artifact_store;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod formats;
pub mod geocode;
pub mod locate;
pub mod logging;
pub mod nominatim;
pub mod openai;
pub mod oracle;
pub mod pipeline;
pub mod publish;
pub mod transcript;
pub mod validate;
pub mod youtube;
