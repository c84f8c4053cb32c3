// src/models/mod.rs

pub mod quiz;
pub mod submission;
pub mod user;
pub mod verification_code;
