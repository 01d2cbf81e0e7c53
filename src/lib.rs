//! Maktaba: a local mirror of a remote library, browsable from the command
//! line or over HTTP.

pub mod config;
pub mod server;
