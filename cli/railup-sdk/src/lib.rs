pub mod models;
pub mod providers;
pub mod utils;

pub mod railup;
