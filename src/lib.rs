pub mod app;
pub mod common;
pub mod config;
pub mod notify;
pub mod outbound;
pub mod persist;
pub mod sandbox;
pub mod subscription;
