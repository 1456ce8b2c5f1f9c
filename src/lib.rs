// Library for tests to access modules

pub mod collector;
pub mod combiner;
pub mod config;
pub mod models;
pub mod pipeline;
pub mod probe;
pub mod routes;
pub mod window;
