pub mod commands;
pub mod formats;
