use crate::{errors::TooCoarse, image_float::ImageFloat, Dims, Error};
use std::ops::Deref;

/// Something that can be halved in resolution to build a pyramid level
pub trait Downsample: Sized {
    fn dims(&self) -> Dims;
    fn downsample(&self) -> Result<Self, Error>;
}

/// A single pyramid level: the caller's original at depth 0, levels owned by
/// the pyramid below that
enum Resolution<'a, T> {
    Original(&'a T),
    Downsampled(T),
}

impl<'a, T> Deref for Resolution<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self {
            Self::Original(t) => t,
            Self::Downsampled(t) => t,
        }
    }
}

/// A stack of resolutions with a current depth, depth 0 being the original.
///
/// Coarser levels are created lazily by `scale_down` and released by
/// `scale_up`, since solving goes strictly coarse to fine after the initial
/// descent.
pub struct Pyramid<'a, T> {
    levels: Vec<Option<Resolution<'a, T>>>,
    depth: usize,
    min_dims: Dims,
}

pub type ImagePyramid<'a> = Pyramid<'a, ImageFloat>;

impl<'a, T: Downsample> Pyramid<'a, T> {
    /// Creates a pyramid over `original` which refuses to create levels
    /// smaller than `min_dims`
    pub fn new(original: &'a T, min_dims: Dims) -> Self {
        Self {
            levels: vec![Some(Resolution::Original(original))],
            depth: 0,
            min_dims,
        }
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[inline]
    pub fn current(&self) -> &T {
        match &self.levels[self.depth] {
            Some(res) => &**res,
            None => unreachable!("the current pyramid level is always populated"),
        }
    }

    /// The dimensions the next coarser level would have
    pub fn next_dims(&self) -> Dims {
        let dims = self.current().dims();
        Dims::new(dims.width / 2, dims.height / 2)
    }

    /// Moves one level coarser, downsampling the current level if that level
    /// doesn't exist yet
    pub fn scale_down(&mut self) -> Result<(), Error> {
        let next = self.next_dims();
        if next.width < self.min_dims.width.max(1) || next.height < self.min_dims.height.max(1) {
            return Err(Error::TooCoarse(TooCoarse {
                depth: self.depth + 1,
                dims: (next.width, next.height),
                min_dims: (self.min_dims.width, self.min_dims.height),
            }));
        }

        let needs_level = self
            .levels
            .get(self.depth + 1)
            .map_or(true, |lvl| lvl.is_none());

        if needs_level {
            let lower = Resolution::Downsampled(self.current().downsample()?);
            if self.depth + 1 == self.levels.len() {
                self.levels.push(Some(lower));
            } else {
                self.levels[self.depth + 1] = Some(lower);
            }
        }

        self.depth += 1;
        Ok(())
    }

    /// Moves one level finer, freeing the level being left
    pub fn scale_up(&mut self) {
        debug_assert!(self.depth > 0, "already at the original resolution");
        if self.depth == 0 {
            return;
        }

        self.levels[self.depth] = None;
        self.depth -= 1;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::image_float::Pixel;

    #[test]
    fn scale_down_then_up() {
        let img = ImageFloat::filled(16, 12, Pixel::gray(0.25)).unwrap();
        let mut pyramid = ImagePyramid::new(&img, Dims::square(3));

        pyramid.scale_down().unwrap();
        assert_eq!(pyramid.depth(), 1);
        assert_eq!(pyramid.current().dims(), Dims::new(8, 6));

        pyramid.scale_down().unwrap();
        assert_eq!(pyramid.current().dims(), Dims::new(4, 3));
        assert!(pyramid
            .current()
            .pixels()
            .iter()
            .all(|px| *px == Pixel::gray(0.25)));

        // 2x1 would be smaller than a 3x3 patch
        assert!(matches!(pyramid.scale_down(), Err(Error::TooCoarse(_))));
        assert_eq!(pyramid.depth(), 2);

        pyramid.scale_up();
        pyramid.scale_up();
        assert_eq!(pyramid.depth(), 0);
        assert!(std::ptr::eq(pyramid.current(), &img));

        // levels released by scale_up are rebuilt on demand
        pyramid.scale_down().unwrap();
        assert_eq!(pyramid.current().dims(), Dims::new(8, 6));
    }

    #[test]
    fn single_pixel_is_too_coarse() {
        let img = ImageFloat::new(1, 1).unwrap();
        let mut pyramid = ImagePyramid::new(&img, Dims::square(1));

        match pyramid.scale_down() {
            Err(Error::TooCoarse(tc)) => assert_eq!(tc.dims, (0, 0)),
            _ => panic!("expected TooCoarse"),
        }
    }
}
