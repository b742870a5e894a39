pub mod analyzer;
pub mod annotations;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod index;
pub mod layout;
pub mod model;
pub mod rpc;
pub mod settings;
