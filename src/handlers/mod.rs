// src/handlers/mod.rs

pub mod actions;
pub mod auth;
pub mod news;
pub mod quiz;
pub mod users;
