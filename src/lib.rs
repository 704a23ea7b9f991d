pub mod aggregation;
pub mod case_store;
pub mod config;
pub mod db_connect;
pub mod env_loader;
pub mod errors;
pub mod excel_reader;
pub mod excel_writer;
pub mod filter;
pub mod image_audit;
pub mod models;
pub mod statistics;
pub mod web;
