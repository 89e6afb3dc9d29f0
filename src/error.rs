use std::path::PathBuf;
use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;
pub type PassiveResult = Result<()>;

pub use std::io::Error as IoError;
pub use std::io::Result as IoResult;


#[derive(Debug)]
pub enum Error {
    /// The file could not be opened at all.
    FileOpen { path: PathBuf, source: IoError },

    /// The text header did not contain the expected sections
    /// (fewer than one head section plus one image section).
    MalformedHeader { path: PathBuf, reason: &'static str },

    /// `Bytes/pixel` was neither 2 nor 4.
    UnsupportedPixelWidth { bytes_per_pixel: u32 },

    /// This error can also occur when reading invalid files,
    /// where the number of bytes to read does not match the input stream length.
    Io(IoError),

    /// The aligner was given an empty template or an empty tile.
    AlignmentInput { reason: &'static str },

    /// A pipeline step was given zero tiles.
    EmptyInput,

    /// The mosaic's value range collapsed to a single value,
    /// so no meaningful z-scale can be derived from it.
    DegenerateRange,
}


impl Error {
    pub fn file_open(path: impl Into<PathBuf>, source: IoError) -> Self {
        Error::FileOpen { path: path.into(), source }
    }

    pub fn malformed_header(path: impl Into<PathBuf>, reason: &'static str) -> Self {
        Error::MalformedHeader { path: path.into(), reason }
    }

    pub fn unsupported_pixel_width(bytes_per_pixel: u32) -> Self {
        Error::UnsupportedPixelWidth { bytes_per_pixel }
    }

    pub fn alignment_input(reason: &'static str) -> Self {
        Error::AlignmentInput { reason }
    }
}


impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::FileOpen { path, source } =>
                write!(f, "failed to open SPM file {}: {}", path.display(), source),

            Error::MalformedHeader { path, reason } =>
                write!(f, "malformed SPM header in {}: {}", path.display(), reason),

            Error::UnsupportedPixelWidth { bytes_per_pixel } =>
                write!(f, "unsupported Bytes/pixel value: {}", bytes_per_pixel),

            Error::Io(source) => write!(f, "I/O error: {}", source),

            Error::AlignmentInput { reason } => write!(f, "invalid aligner input: {}", reason),

            Error::EmptyInput => write!(f, "no tiles were provided"),

            Error::DegenerateRange =>
                write!(f, "mosaic value range is degenerate (max == min); refusing to derive a z-scale"),
        }
    }
}

impl std::error::Error for Error {}


/// Enable using the `?` operator on io::Result
impl From<IoError> for Error {
    fn from(error: IoError) -> Self {
        Error::Io(error)
    }
}
