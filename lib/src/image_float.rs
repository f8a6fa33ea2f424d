use crate::{img_pyramid::Downsample, Dims, Error};
use std::ops::{Add, Div, Mul, Sub};

/// A linear RGB color with channels in `[0, 1]`
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Pixel {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Pixel {
    pub const BLACK: Pixel = Pixel::new(0.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub const fn gray(v: f32) -> Self {
        Self { r: v, g: v, b: v }
    }

    #[inline]
    pub(crate) fn from_rgba(px: image::Rgba<u8>) -> Self {
        Self {
            r: f32::from(px[0]) / 255.0,
            g: f32::from(px[1]) / 255.0,
            b: f32::from(px[2]) / 255.0,
        }
    }

    #[inline]
    pub(crate) fn to_rgba(self, alpha: u8) -> image::Rgba<u8> {
        image::Rgba([to_u8(self.r), to_u8(self.g), to_u8(self.b), alpha])
    }

    /// Squared euclidean distance over the three channels
    #[inline]
    pub fn distance_2(self, other: Self) -> f32 {
        let dr = self.r - other.r;
        let dg = self.g - other.g;
        let db = self.b - other.b;
        dr * dr + dg * dg + db * db
    }

    #[inline]
    pub(crate) fn lerp(self, other: Self, t: f32) -> Self {
        self + (other - self) * t
    }
}

#[inline]
fn to_u8(v: f32) -> u8 {
    (v.max(0.0).min(1.0) * 255.0).round() as u8
}

impl Add for Pixel {
    type Output = Self;

    #[inline]
    fn add(self, o: Self) -> Self {
        Self::new(self.r + o.r, self.g + o.g, self.b + o.b)
    }
}

impl Sub for Pixel {
    type Output = Self;

    #[inline]
    fn sub(self, o: Self) -> Self {
        Self::new(self.r - o.r, self.g - o.g, self.b - o.b)
    }
}

impl Mul<f32> for Pixel {
    type Output = Self;

    #[inline]
    fn mul(self, s: f32) -> Self {
        Self::new(self.r * s, self.g * s, self.b * s)
    }
}

impl Div<f32> for Pixel {
    type Output = Self;

    #[inline]
    fn div(self, s: f32) -> Self {
        Self::new(self.r / s, self.g / s, self.b / s)
    }
}

/// Row-major floating point RGB image.
///
/// The zero sized image returned by `Default` stands for "not created yet",
/// every image built through `new` is at least 1x1.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImageFloat {
    width: u32,
    height: u32,
    data: Vec<Pixel>,
}

impl ImageFloat {
    /// Allocates a black image, failing with `Error::OutOfMemory` rather
    /// than aborting when the buffer can't be reserved
    pub fn new(width: u32, height: u32) -> Result<Self, Error> {
        Self::filled(width, height, Pixel::BLACK)
    }

    pub fn filled(width: u32, height: u32, px: Pixel) -> Result<Self, Error> {
        debug_assert!(width > 0 && height > 0);
        let len = width as usize * height as usize;
        let mut data = Vec::new();
        data.try_reserve_exact(len)?;
        data.resize(len, px);
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn from_fn<F>(width: u32, height: u32, mut f: F) -> Result<Self, Error>
    where
        F: FnMut(u32, u32) -> Pixel,
    {
        let mut img = Self::new(width, height)?;
        for y in 0..height {
            for x in 0..width {
                img.set_pixel(x, y, f(x, y));
            }
        }
        Ok(img)
    }

    /// Converts an 8-bit image, dropping its alpha channel
    pub fn from_rgba(img: &image::RgbaImage) -> Result<Self, Error> {
        let (width, height) = img.dimensions();
        let mut data = Vec::new();
        data.try_reserve_exact(width as usize * height as usize)?;
        data.extend(img.pixels().map(|px| Pixel::from_rgba(*px)));
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Converts to an 8-bit image, clamping every channel to `[0, 1]` first
    pub fn to_rgba(&self) -> image::RgbaImage {
        image::RgbaImage::from_fn(self.width, self.height, |x, y| {
            self.pixel(x, y).to_rgba(255)
        })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn dims(&self) -> Dims {
        Dims::new(self.width, self.height)
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> Pixel {
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// Same as `pixel`, for coordinates the caller has already bounds checked
    #[inline]
    pub(crate) fn pixel_i(&self, x: i32, y: i32) -> Pixel {
        debug_assert!(self.contains(x, y));
        self.data[y as usize * self.width as usize + x as usize]
    }

    #[inline]
    pub fn set_pixel(&mut self, x: u32, y: u32, px: Pixel) {
        let w = self.width as usize;
        self.data[y as usize * w + x as usize] = px;
    }

    #[inline]
    pub(crate) fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.width as i32 && y < self.height as i32
    }

    pub fn pixels(&self) -> &[Pixel] {
        &self.data
    }

    /// Copies this image into `dst`, resizing `dst` as needed
    pub fn copy_to(&self, dst: &mut ImageFloat) {
        dst.width = self.width;
        dst.height = self.height;
        dst.data.clear();
        dst.data.extend_from_slice(&self.data);
    }

    /// Halves the resolution by averaging 2x2 blocks. Odd dimensions are
    /// floored, so the last row or column is dropped and every block is
    /// complete.
    pub fn downsample(&self) -> Result<ImageFloat, Error> {
        let (width, height) = (self.width / 2, self.height / 2);
        debug_assert!(width > 0 && height > 0);

        let mut out = ImageFloat::new(width, height)?;
        for y in 0..height {
            let upper = y * 2;
            let lower = upper + 1;
            for x in 0..width {
                let left = x * 2;
                let right = left + 1;

                let sum = self.pixel(left, upper)
                    + self.pixel(right, upper)
                    + self.pixel(left, lower)
                    + self.pixel(right, lower);
                out.set_pixel(x, y, sum * 0.25);
            }
        }

        Ok(out)
    }
}

impl Downsample for ImageFloat {
    fn dims(&self) -> Dims {
        ImageFloat::dims(self)
    }

    fn downsample(&self) -> Result<Self, Error> {
        ImageFloat::downsample(self)
    }
}
