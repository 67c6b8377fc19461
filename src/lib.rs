// Library for tests to access modules

pub mod canary;
pub mod config;
pub mod datadog;
pub mod grid;
pub mod maintainer;
pub mod models;
pub mod notify;
pub mod persist;
pub mod pinger;
pub mod routes;
pub mod scraper;
pub mod sheet;
pub mod version;
pub mod watcher;
