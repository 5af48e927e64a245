pub mod devices;
pub mod health;
pub mod page;
pub mod status;
