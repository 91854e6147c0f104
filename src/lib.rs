//! Nozzle and filament validation for 3D-printer hosts
//!
//! Before a print starts, the sliced file's trailer is compared with the
//! printer: model, nozzle sizes, loaded filament, build plate and, when
//! spool tracking is enabled, the exact spool per extruder. Contradictions
//! cancel the print; anything that cannot be verified pauses it.

pub mod config;
pub mod host;
pub mod lexer;
pub mod model;
pub mod parser;
pub mod plugin;
pub mod post;
pub mod spool;
pub mod store;
pub mod validator;
pub mod wait;
