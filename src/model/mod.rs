pub mod api;
pub mod auth;
pub mod ballot;
pub mod db;
pub mod memory;
pub mod mobile;
pub mod mongodb;
pub mod otp;
pub mod store;
