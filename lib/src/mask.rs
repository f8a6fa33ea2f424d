use crate::{
    img_pyramid::{Downsample, Pyramid},
    utils::ChannelMask,
    Dims, Error,
};

/// The state of a single mask pixel
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MaskValue {
    /// Pixel is kept as is and may be sourced from
    Known,
    /// Pixel is part of the hole and will be synthesized
    Unknown,
    /// Pixel is kept as is, but is neither sourced from nor compared against
    Ignored,
}

impl MaskValue {
    #[inline]
    fn index(self) -> usize {
        match self {
            Self::Known => 0,
            Self::Unknown => 1,
            Self::Ignored => 2,
        }
    }
}

// Mask images: dark pixels are the hole, light pixels are kept and anything
// in between is ignored
const UNKNOWN_BELOW: u8 = 85;
const KNOWN_ABOVE: u8 = 170;
// Channel masks are binary
const CHANNEL_THRESHOLD: u8 = 128;

/// Tri-state per-pixel map marking which pixels of an image are to be filled.
///
/// The mask is immutable once built, which lets it keep a summed-area table
/// per state so that `region_has_any` is O(1).
#[derive(Clone, Debug)]
pub struct Mask {
    width: u32,
    height: u32,
    values: Vec<MaskValue>,
    // (width + 1) * (height + 1) prefix sums, one table per state
    tables: [Vec<u32>; 3],
}

impl Mask {
    pub fn from_fn<F>(width: u32, height: u32, mut f: F) -> Result<Self, Error>
    where
        F: FnMut(u32, u32) -> MaskValue,
    {
        let mut values = Vec::new();
        values.try_reserve_exact(width as usize * height as usize)?;
        for y in 0..height {
            for x in 0..width {
                values.push(f(x, y));
            }
        }

        Self::from_values(width, height, values)
    }

    pub fn filled(width: u32, height: u32, value: MaskValue) -> Result<Self, Error> {
        Self::from_fn(width, height, |_, _| value)
    }

    fn from_values(width: u32, height: u32, values: Vec<MaskValue>) -> Result<Self, Error> {
        debug_assert_eq!(values.len(), width as usize * height as usize);

        let stride = width as usize + 1;
        let len = stride * (height as usize + 1);
        let mut tables = [Vec::new(), Vec::new(), Vec::new()];
        for table in tables.iter_mut() {
            table.try_reserve_exact(len)?;
            table.resize(len, 0);
        }

        for y in 0..height as usize {
            let mut row_sums = [0u32; 3];
            for x in 0..width as usize {
                row_sums[values[y * width as usize + x].index()] += 1;

                let i = (y + 1) * stride + x + 1;
                for (table, row_sum) in tables.iter_mut().zip(row_sums.iter()) {
                    table[i] = table[i - stride] + row_sum;
                }
            }
        }

        Ok(Self {
            width,
            height,
            values,
            tables,
        })
    }

    /// Reads a mask image, dark pixels become `Unknown`, light pixels
    /// `Known`, and mid grays `Ignored`
    pub fn from_image(img: &image::RgbaImage) -> Result<Self, Error> {
        let (width, height) = img.dimensions();
        Self::from_fn(width, height, |x, y| {
            let v = img.get_pixel(x, y)[0];
            if v < UNKNOWN_BELOW {
                MaskValue::Unknown
            } else if v > KNOWN_ABOVE {
                MaskValue::Known
            } else {
                MaskValue::Ignored
            }
        })
    }

    /// Uses a single channel of an image as a binary mask, eg. the alpha
    /// channel, where transparent pixels are the hole
    pub fn from_channel(img: &image::RgbaImage, channel: ChannelMask) -> Result<Self, Error> {
        let (width, height) = img.dimensions();
        let channel = channel.index();
        Self::from_fn(width, height, |x, y| {
            if img.get_pixel(x, y)[channel] < CHANNEL_THRESHOLD {
                MaskValue::Unknown
            } else {
                MaskValue::Known
            }
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
    pub fn get(&self, x: u32, y: u32) -> MaskValue {
        self.values[y as usize * self.width as usize + x as usize]
    }

    /// Like `get`, but coordinates outside of the mask are `Ignored`
    #[inline]
    pub fn get_i(&self, x: i32, y: i32) -> MaskValue {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            MaskValue::Ignored
        } else {
            self.values[y as usize * self.width as usize + x as usize]
        }
    }

    /// The number of pixels in the whole mask with the given state
    pub fn count(&self, state: MaskValue) -> u32 {
        self.tables[state.index()][self.tables[0].len() - 1]
    }

    /// Counts the pixels with `state` in the part of the `w`x`h` region at
    /// `x`,`y` that lies inside the mask
    pub fn region_count(&self, x: i32, y: i32, w: u32, h: u32, state: MaskValue) -> u32 {
        let x0 = x.max(0).min(self.width as i32) as usize;
        let y0 = y.max(0).min(self.height as i32) as usize;
        let x1 = (x + w as i32).max(0).min(self.width as i32) as usize;
        let y1 = (y + h as i32).max(0).min(self.height as i32) as usize;

        if x0 >= x1 || y0 >= y1 {
            return 0;
        }

        let stride = self.width as usize + 1;
        let table = &self.tables[state.index()];
        table[y1 * stride + x1] + table[y0 * stride + x0]
            - table[y0 * stride + x1]
            - table[y1 * stride + x0]
    }

    /// Returns true if any pixel in the `w`x`h` region at `x`,`y` has the
    /// given state. Pixels outside the mask are `Ignored`.
    pub fn region_has_any(&self, x: i32, y: i32, w: u32, h: u32, state: MaskValue) -> bool {
        if w == 0 || h == 0 {
            return false;
        }

        if state == MaskValue::Ignored {
            let off_mask = x < 0
                || y < 0
                || x + w as i32 > self.width as i32
                || y + h as i32 > self.height as i32;
            if off_mask {
                return true;
            }
        }

        self.region_count(x, y, w, h, state) > 0
    }

    /// Returns true if every pixel of the region is inside the mask and has
    /// the given state
    pub fn region_is_all(&self, x: i32, y: i32, w: u32, h: u32, state: MaskValue) -> bool {
        let inside = x >= 0
            && y >= 0
            && x + w as i32 <= self.width as i32
            && y + h as i32 <= self.height as i32;

        inside && self.region_count(x, y, w, h, state) == w * h
    }
}

impl Downsample for Mask {
    fn dims(&self) -> Dims {
        Mask::dims(self)
    }

    /// Unknown wins over ignored, which wins over known, so that the coarser
    /// mask always covers the hole
    fn downsample(&self) -> Result<Self, Error> {
        let (width, height) = (self.width / 2, self.height / 2);
        debug_assert!(width > 0 && height > 0);

        Mask::from_fn(width, height, |x, y| {
            let block = [
                self.get(x * 2, y * 2),
                self.get(x * 2 + 1, y * 2),
                self.get(x * 2, y * 2 + 1),
                self.get(x * 2 + 1, y * 2 + 1),
            ];

            if block.contains(&MaskValue::Unknown) {
                MaskValue::Unknown
            } else if block.contains(&MaskValue::Ignored) {
                MaskValue::Ignored
            } else {
                MaskValue::Known
            }
        })
    }
}

/// The mask's level of detail stack, kept in lock-step with the image pyramid
pub type MaskPyramid<'a> = Pyramid<'a, Mask>;

impl<'a> Pyramid<'a, Mask> {
    /// `Mask::region_has_any` on the current level
    #[inline]
    pub fn region_has_any(&self, x: i32, y: i32, w: u32, h: u32, state: MaskValue) -> bool {
        self.current().region_has_any(x, y, w, h, state)
    }
}
