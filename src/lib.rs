pub mod catalog;
pub mod config;
pub mod fetch;
pub mod gbfs;
pub mod geo;
pub mod output;
pub mod poller;
pub mod reconstructor;
pub mod snapshot;
pub mod source;
pub mod tracker;
pub mod trip;
