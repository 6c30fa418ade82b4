//! Reusable UI widgets for wsman.

pub mod confirm;
pub mod dependency_panel;
pub mod help;
pub mod output_panel;
pub mod package_detail;
pub mod package_list;
pub mod text_input;
