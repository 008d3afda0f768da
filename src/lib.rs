pub mod analyzers;
pub mod auth;
pub mod config;
pub mod diff;
pub mod providers;
pub mod review;
