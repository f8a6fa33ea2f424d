use crate::{
    compositor::{self, PatchType},
    image_float::ImageFloat,
    label::Label,
    mask::Mask,
    Dims, Error,
};
use std::io::{self, Read, Write};

/// A committed node: the output position of a patch and where it was copied
/// from
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PlacedPatch {
    pub x: i32,
    pub y: i32,
    pub label: Label,
}

/// The result of a completion before any pixel is painted: every patch placed
/// over the hole, in the order they were committed.
///
/// A layout can be saved, and later re-applied to another image of the same
/// size, eg. to complete a normal map the same way as its albedo.
#[derive(Clone, Debug, PartialEq)]
pub struct PatchLayout {
    dims: Dims,
    patch: Dims,
    patches: Vec<PlacedPatch>,
}

const LAYOUT_MAGIC: u32 = 0x5042_0001;

impl PatchLayout {
    pub(crate) fn new(dims: Dims, patch: Dims, patches: Vec<PlacedPatch>) -> Self {
        Self {
            dims,
            patch,
            patches,
        }
    }

    /// The dimensions of the image the layout was made for
    #[inline]
    pub fn dims(&self) -> Dims {
        self.dims
    }

    #[inline]
    pub fn patch_dims(&self) -> Dims {
        self.patch
    }

    #[inline]
    pub fn patches(&self) -> &[PlacedPatch] {
        &self.patches
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Paints the layout over the unknown pixels of `mask`, sourcing patches
    /// from `source` instead of the image the layout was computed on
    pub fn apply(
        &self,
        source: &ImageFloat,
        mask: &Mask,
        patch_type: PatchType,
    ) -> Result<ImageFloat, Error> {
        if source.dims() != self.dims || mask.dims() != self.dims {
            let other = if source.dims() != self.dims {
                source.dims()
            } else {
                mask.dims()
            };

            return Err(Error::LayoutMismatch(
                (self.dims.width, self.dims.height),
                (other.width, other.height),
            ));
        }

        compositor::composite(source, mask, self, patch_type)
    }

    /// Serializes the layout, returning the number of bytes written
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<usize> {
        let header = [
            LAYOUT_MAGIC,
            self.dims.width,
            self.dims.height,
            self.patch.width,
            self.patch.height,
            self.patches.len() as u32,
        ];

        let mut written = 0;
        for h in &header {
            w.write_all(&h.to_le_bytes())?;
            written += 4;
        }

        for p in &self.patches {
            for v in &[p.x, p.y, p.label.x, p.label.y] {
                w.write_all(&v.to_le_bytes())?;
                written += 4;
            }
        }

        Ok(written)
    }

    pub fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        use std::io::ErrorKind;

        fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
            let mut buf = [0u8; 4];
            r.read_exact(&mut buf)?;
            Ok(u32::from_le_bytes(buf))
        }

        fn read_i32<R: Read>(r: &mut R) -> io::Result<i32> {
            let mut buf = [0u8; 4];
            r.read_exact(&mut buf)?;
            Ok(i32::from_le_bytes(buf))
        }

        let magic = read_u32(r)?;
        if magic >> 16 != LAYOUT_MAGIC >> 16 {
            return Err(io::Error::new(ErrorKind::InvalidData, "invalid magic"));
        }

        match magic & 0x0000_ffff {
            0x1 => {}
            _ => return Err(io::Error::new(ErrorKind::InvalidData, "invalid version")),
        }

        let dims = Dims::new(read_u32(r)?, read_u32(r)?);
        let patch = Dims::new(read_u32(r)?, read_u32(r)?);

        let valid_side =
            |side: u32, image_side: u32| side >= 3 && side % 2 == 1 && side <= image_side;
        if !valid_side(patch.width, dims.width) || !valid_side(patch.height, dims.height) {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                "patch dimensions must be odd, at least 3 and fit in the image",
            ));
        }

        let count = read_u32(r)? as usize;
        let (hw, hh) = (patch.width as i32 / 2, patch.height as i32 / 2);

        // the count comes from the file, so don't trust it for the allocation
        let mut patches = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            let (x, y) = (read_i32(r)?, read_i32(r)?);
            let label = Label::new(read_i32(r)?, read_i32(r)?);

            let in_bounds = label.x >= hw
                && label.y >= hh
                && label.x + hw < dims.width as i32
                && label.y + hh < dims.height as i32;
            if !in_bounds {
                return Err(io::Error::new(
                    ErrorKind::InvalidData,
                    "source patch lies outside of the image",
                ));
            }

            patches.push(PlacedPatch { x, y, label });
        }

        Ok(Self {
            dims,
            patch,
            patches,
        })
    }
}
