//! # Funding Readiness Engine
//!
//! Ingests payment-provider events, aggregates them into per-business metrics,
//! scores funding readiness and issues recommendations, driven by a periodic
//! pipeline and exposed over an HTTP API.

pub mod aggregation;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod ingestion;
pub mod models;
pub mod normalization;
pub mod pipeline;
pub mod provider;
pub mod recommendations;
pub mod repositories;
pub mod scoring;
pub mod server;
pub mod telemetry;
pub mod tools;
pub mod webhook_verification;
pub use migration;
