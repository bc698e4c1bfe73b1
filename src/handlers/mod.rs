pub mod accounts;
pub mod admin;
pub mod device;
pub mod health;
