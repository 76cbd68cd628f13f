// src/services/mod.rs

pub mod checkout;
pub mod firebase;
pub mod inventory;
pub mod mailer;
pub mod razorpay;
