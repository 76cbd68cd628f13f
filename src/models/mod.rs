// src/models/mod.rs

pub mod address;
pub mod cart;
pub mod order;
pub mod product;
pub mod review;
pub mod user;
