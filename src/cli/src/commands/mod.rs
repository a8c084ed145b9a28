pub mod audit;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod health;
pub mod roles;
pub mod users;
