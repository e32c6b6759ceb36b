// Domain layer: models, InfluxDB result shapes and ports. No HTTP or runtime dependencies.

pub mod model;
pub mod ports;
pub mod series;
