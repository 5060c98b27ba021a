pub mod config;
pub mod expr;
pub mod message;
pub mod rule;
