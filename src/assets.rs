pub(crate) mod blob;
pub(crate) mod decode;
pub(crate) mod loader;
pub(crate) mod svg_raster;
