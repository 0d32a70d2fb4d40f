//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod file_config_adapter;
pub mod mock_feed;
pub mod sqlite_adapter;
pub mod svg_chart;
#[cfg(feature = "web")]
pub mod web;
