pub mod app;
pub mod constants;
pub mod errors;
pub mod gateway;
pub mod managers;
pub mod services;
pub mod stores;
pub mod utils;
