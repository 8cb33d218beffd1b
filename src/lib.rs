//! Anime Episode Stream Library
//!
//! This library resolves anime episode pages to their video host streaming
//! links by driving a shared headless browser, and exposes the resolution
//! through a REST API endpoint.

pub mod browser;
pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod parser;
pub mod routes;
pub mod scraper;
