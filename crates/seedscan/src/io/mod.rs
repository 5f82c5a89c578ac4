pub mod geojson;

pub use self::geojson::{read_seed_properties, SeedProperties, TypedFeature};
