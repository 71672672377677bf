//! Raster data structures and coordinate math

mod block;
mod element;
mod extent;
mod geotransform;
mod window;

pub use block::BandArray;
pub use element::{DataType, RasterElement};
pub use extent::GeoExtent;
pub use geotransform::GeoTransform;
pub use window::PixelWindow;
