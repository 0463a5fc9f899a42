pub mod cli;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod geocoder;
pub mod logging;
pub mod persistence;
pub mod placemark;
pub mod presenter;
pub mod recent;
pub mod services;
pub mod util;
