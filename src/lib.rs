pub mod aws;
pub mod cli;
pub mod commands;
pub mod constants;
pub mod error;
pub mod provider;
pub mod session;
pub mod signal;
pub mod tunnel;
