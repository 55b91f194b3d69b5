pub mod raster;

pub use raster::{RasterSlide, RasterSlideOpener};
