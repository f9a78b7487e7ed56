pub mod lockfile;
pub mod manager;
pub mod packages;
pub mod platform;
pub mod recipe;
