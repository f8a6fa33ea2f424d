use std::fmt;

#[derive(Debug)]
pub struct InvalidSetting {
    pub(crate) name: &'static str,
    pub(crate) value: String,
    pub(crate) constraint: &'static str,
}

impl fmt::Display for InvalidSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "setting '{}' - value '{}' is invalid, it must be {}",
            self.name, self.value, self.constraint
        )
    }
}

#[derive(Debug)]
pub struct SizeMismatch {
    pub(crate) image: (u32, u32),
    pub(crate) mask: (u32, u32),
}

impl fmt::Display for SizeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "the mask size ({}x{}) must match the image size ({}x{})",
            self.mask.0, self.mask.1, self.image.0, self.image.1
        )
    }
}

#[derive(Debug)]
pub struct TooCoarse {
    pub(crate) depth: usize,
    pub(crate) dims: (u32, u32),
    pub(crate) min_dims: (u32, u32),
}

impl fmt::Display for TooCoarse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pyramid level {} would be {}x{}, smaller than the {}x{} patch",
            self.depth, self.dims.0, self.dims.1, self.min_dims.0, self.min_dims.1
        )
    }
}

#[derive(Debug)]
pub enum Error {
    /// An error in the image library occurred, eg failed to load/save
    Image(image::ImageError),
    /// A setting was outside of its allowed range
    InvalidSettings(InvalidSetting),
    /// The mask and the image must have identical dimensions
    DimensionMismatch(SizeMismatch),
    /// The mask has no known pixels, so there is nothing to source patches from
    FullyUnknown,
    /// Known pixels exist, but no whole patch fits on them
    NoSourcePatches,
    /// A pyramid level would be smaller than a patch
    TooCoarse(TooCoarse),
    /// A buffer allocation failed
    OutOfMemory,
    /// The cancellation token was raised while solving
    Cancelled,
    /// Io is notoriously error free with no problems, but we cover it just in case!
    Io(std::io::Error),
    /// The user specified an image format we don't support as the output
    UnsupportedOutputFormat(String),
    /// The session was built without an input image or without a mask
    MissingInput(&'static str),
    /// A patch layout was applied to a source image of a different size
    LayoutMismatch((u32, u32), (u32, u32)),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Image(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image(ie) => write!(f, "{}", ie),
            Self::InvalidSettings(is) => write!(f, "{}", is),
            Self::DimensionMismatch(sm) => write!(f, "{}", sm),
            Self::FullyUnknown => write!(
                f,
                "the mask marks every pixel as unknown, at least 1 known pixel is required"
            ),
            Self::NoSourcePatches => write!(
                f,
                "no patch fits entirely inside the known region of the image"
            ),
            Self::TooCoarse(tc) => write!(f, "{}", tc),
            Self::OutOfMemory => write!(f, "failed to allocate memory for the completion"),
            Self::Cancelled => write!(f, "the completion was cancelled"),
            Self::Io(io) => write!(f, "{}", io),
            Self::UnsupportedOutputFormat(fmt) => {
                write!(f, "the output format '{}' is not supported", fmt)
            }
            Self::MissingInput(what) => write!(f, "no {} was provided", what),
            Self::LayoutMismatch(layout, source) => write!(
                f,
                "the patch layout was made for a {}x{} image, but the source is {}x{}",
                layout.0, layout.1, source.0, source.1
            ),
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(ie: image::ImageError) -> Self {
        Self::Image(ie)
    }
}

impl From<std::io::Error> for Error {
    fn from(io: std::io::Error) -> Self {
        Self::Io(io)
    }
}

impl From<std::collections::TryReserveError> for Error {
    fn from(_: std::collections::TryReserveError) -> Self {
        Self::OutOfMemory
    }
}
