pub mod app;
pub mod assembly;
pub mod config;
pub mod domain;
pub mod ensembl;
pub mod error;
pub mod fetch;
pub mod fs_util;
pub mod location;
pub mod metadata;
pub mod output;
pub mod resolver;
pub mod store;
pub mod tui;
pub mod uniprot;
