//! Core data types and I/O operations.

pub mod dates;
pub mod loaders;
pub mod transforms;
pub mod types;
pub mod writers;

pub use dates::{decode_date_code, DateError};
pub use loaders::{load_raster, Crs, LoaderError, Raster};
pub use types::{Cluster, PixelRegion, PolygonId, RawPolygon};
pub use writers::{write_clusters_csv, write_clusters_geojson, write_polygons_geojson, WriteError};
