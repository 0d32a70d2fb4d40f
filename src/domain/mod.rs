//! Core domain types and services.

pub mod account;
pub mod analytics;
pub mod backfill;
pub mod backtest;
pub mod config_validation;
pub mod dashboard;
pub mod error;
pub mod execution;
pub mod features;
pub mod indicators;
pub mod interval;
pub mod metrics;
pub mod ml;
pub mod news;
pub mod ohlcv;
pub mod portfolio;
pub mod position;
pub mod price_series;
pub mod session;
pub mod strategy;
pub mod ticker;
pub mod universe;
