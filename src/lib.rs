//! wsman: terminal workspace manager for multi-package source trees
//!
//! This crate scans a colcon-style workspace into a package dependency graph,
//! lets an operator select packages, drives the external build tool for that
//! selection and cleans build artifacts while keeping an allow-list.

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod ui;
pub mod workspace;

pub use app::App;
pub use config::AppConfig;
pub use error::{AppError, Result};
pub use workspace::Workspace;
