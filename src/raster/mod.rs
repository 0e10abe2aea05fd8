//! Raster primitives shared by the write and read paths.
//!
//! - [`color`]: packed RGBA colors, pure-color tile tokens, and the
//!   uniform-region predicate the quadtree splitter is built on.
//! - [`codec`]: the PNG decode/encode seam. Everything above this module
//!   works on contiguous 8-bit RGBA buffers.

pub mod codec;
pub mod color;
