// src/models/mod.rs

pub mod action;
pub mod news;
pub mod participation;
pub mod quiz;
pub mod role;
pub mod user;
