//! Request handlers

pub mod campaigns;
pub mod health;
pub mod send;
pub mod webhooks;
