//! Price and stock monitoring for external product pages

pub mod cache;
pub mod catalog;
pub mod config;
pub mod discord;
pub mod fetch;
pub mod models;
pub mod monitor;
pub mod pagination;
pub mod price;
pub mod price_watch;
pub mod ranking;

pub use price_watch::PriceWatch;
