// Adapters: InfluxDB and Elia grid data over HTTP.

pub mod griddata;
pub mod influx;

pub use griddata::GridDataClient;
pub use influx::InfluxClient;
