// src/handlers/mod.rs

pub mod admin;
pub mod auth;
pub mod cart;
pub mod order;
pub mod product;
pub mod profile;
pub mod review;
pub mod superadmin;
pub mod webhook;
