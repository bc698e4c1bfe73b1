pub mod account;
pub mod activity;
pub mod device;
