pub mod accession;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetch_cache;
pub mod http;
pub mod inversion;
pub mod matcher;
pub mod merge;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod portal;
pub mod store;
pub mod text;
pub mod versioner;
pub mod xref;
