use thiserror::Error;

/// Errors from the PNG codec seam.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The image file could not be opened or read.
    #[error("failed to read image {path}: {message}")]
    Read { path: String, message: String },

    /// The image data could not be decoded.
    #[error("failed to decode image {path}: {message}")]
    Decode { path: String, message: String },

    /// The pixel buffer could not be encoded or written.
    #[error("failed to encode image {path}: {message}")]
    Encode { path: String, message: String },

    /// The pixel buffer length does not match the stated dimensions.
    #[error("pixel buffer of {len} bytes does not match {width}x{height} RGBA")]
    BufferSize { width: u32, height: u32, len: usize },
}

/// Errors when reading or writing a tile manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest file could not be opened.
    #[error("failed to open manifest {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The manifest file could not be written.
    #[error("failed to write manifest {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the tile splitters.
#[derive(Debug, Error)]
pub enum SplitError {
    /// The source image could not be loaded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The tile output directory could not be created.
    #[error("failed to create output directory {path}: {source}")]
    OutputDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from viewport assembly.
#[derive(Debug, Error)]
pub enum AssembleError {
    /// No tiles intersect the requested viewport.
    #[error("no tiles overlap viewport ({x},{y}) {w}x{h}")]
    EmptyViewport { x: i32, y: i32, w: i32, h: i32 },

    /// The assembled canvas could not be encoded or written.
    #[error(transparent)]
    Encode(#[from] CodecError),
}
