pub mod bootstrap;
pub mod config;
pub mod exec;
pub mod hooks;
pub mod listener;
pub mod supervisor;
