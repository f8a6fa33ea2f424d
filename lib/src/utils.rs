use crate::Error;
use std::path::Path;

/// Helper type used to define the source of `ImageSource`'s data
#[derive(Clone)]
pub enum ImageSource<'a> {
    /// A raw buffer of image data, see `image::load_from_memory` for details
    /// on what is supported
    Memory(&'a [u8]),
    /// The path to an image to load from disk. The image format is inferred
    /// from the file extension, see `image::open` for details
    Path(&'a Path),
    /// An already loaded image that is passed directly to the session
    Image(image::DynamicImage),
}

impl<'a> From<image::DynamicImage> for ImageSource<'a> {
    fn from(img: image::DynamicImage) -> Self {
        Self::Image(img)
    }
}

impl<'a> From<image::RgbaImage> for ImageSource<'a> {
    fn from(img: image::RgbaImage) -> Self {
        Self::Image(image::DynamicImage::ImageRgba8(img))
    }
}

impl<'a, S> From<&'a S> for ImageSource<'a>
where
    S: AsRef<Path> + 'a,
{
    fn from(path: &'a S) -> Self {
        Self::Path(path.as_ref())
    }
}

pub fn load_dynamic_image(src: ImageSource<'_>) -> Result<image::DynamicImage, image::ImageError> {
    match src {
        ImageSource::Memory(data) => image::load_from_memory(data),
        ImageSource::Path(path) => image::open(path),
        ImageSource::Image(img) => Ok(img),
    }
}

/// Helper type used to pick the channel of an image that serves as the mask
#[derive(Clone, Copy, Debug)]
pub enum ChannelMask {
    R,
    G,
    B,
    A,
}

impl ChannelMask {
    #[inline]
    pub(crate) fn index(self) -> usize {
        match self {
            ChannelMask::R => 0,
            ChannelMask::G => 1,
            ChannelMask::B => 2,
            ChannelMask::A => 3,
        }
    }
}

impl std::str::FromStr for ChannelMask {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r" | "R" => Ok(ChannelMask::R),
            "g" | "G" => Ok(ChannelMask::G),
            "b" | "B" => Ok(ChannelMask::B),
            "a" | "A" => Ok(ChannelMask::A),
            other => Err(format!("channel `{}` not one of: 'r', 'g', 'b', 'a'", other)),
        }
    }
}

pub(crate) fn load_image(src: ImageSource<'_>) -> Result<image::RgbaImage, Error> {
    Ok(load_dynamic_image(src)?.to_rgba())
}
