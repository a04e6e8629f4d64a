// src/handlers/mod.rs

pub mod admin;
pub mod quiz;
pub mod report;
