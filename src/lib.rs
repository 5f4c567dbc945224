pub mod aux_data;
pub mod aux_fetch;
pub mod config;
pub mod http_client;
pub mod index;
pub mod logging;
pub mod merge;
pub mod model;
pub mod output;
pub mod pages;
pub mod schedule_fetch;
pub mod shard;
pub mod site;
pub mod sitemap;
pub mod template;
pub mod time_resolver;
