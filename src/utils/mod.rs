// src/utils/mod.rs

pub mod audit;
pub mod format;
pub mod hash;
pub mod html;
pub mod jwt;
