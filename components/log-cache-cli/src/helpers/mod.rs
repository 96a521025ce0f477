pub mod duration;
pub mod load_config;
pub mod shutdown;
