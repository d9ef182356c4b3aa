pub mod commands;
pub mod context;
pub mod hooks;
pub mod repository;
pub mod runtime;
