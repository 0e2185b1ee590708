pub mod config;
pub mod dataset;
pub mod fetch;
pub mod live;
pub mod model;
pub mod parser;
pub mod server;
pub mod spatial;
pub mod tracker;

pub mod gtfs_rt {
    include!(concat!(env!("OUT_DIR"), "/transit_realtime.rs"));
}
