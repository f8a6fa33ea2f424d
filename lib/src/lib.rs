// BEGIN - Embark standard lints v0.4
// do not change or add/remove here, but one can add exceptions after this section
// for more info see: <https://github.com/EmbarkStudios/rust-ecosystem/issues/59>
#![deny(unsafe_code)]
#![warn(
    clippy::all,
    clippy::await_holding_lock,
    clippy::char_lit_as_u8,
    clippy::checked_conversions,
    clippy::dbg_macro,
    clippy::debug_assert_with_mut_call,
    clippy::doc_markdown,
    clippy::empty_enum,
    clippy::enum_glob_use,
    clippy::exit,
    clippy::expl_impl_clone_on_copy,
    clippy::explicit_deref_methods,
    clippy::explicit_into_iter_loop,
    clippy::fallible_impl_from,
    clippy::filter_map_next,
    clippy::float_cmp_const,
    clippy::fn_params_excessive_bools,
    clippy::if_let_mutex,
    clippy::implicit_clone,
    clippy::imprecise_flops,
    clippy::inefficient_to_string,
    clippy::invalid_upcast_comparisons,
    clippy::large_types_passed_by_value,
    clippy::let_unit_value,
    clippy::linkedlist,
    clippy::lossy_float_literal,
    clippy::macro_use_imports,
    clippy::manual_ok_or,
    clippy::map_err_ignore,
    clippy::map_flatten,
    clippy::map_unwrap_or,
    clippy::match_on_vec_items,
    clippy::match_same_arms,
    clippy::match_wildcard_for_single_variants,
    clippy::mem_forget,
    clippy::mismatched_target_os,
    clippy::mut_mut,
    clippy::mutex_integer,
    clippy::needless_borrow,
    clippy::needless_continue,
    clippy::option_option,
    clippy::path_buf_push_overwrite,
    clippy::ptr_as_ptr,
    clippy::ref_option_ref,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::same_functions_in_if_condition,
    clippy::semicolon_if_nothing_returned,
    clippy::string_add_assign,
    clippy::string_add,
    clippy::string_lit_as_bytes,
    clippy::string_to_string,
    clippy::todo,
    clippy::trait_duplication_in_bounds,
    clippy::unimplemented,
    clippy::unnested_or_patterns,
    clippy::unused_self,
    clippy::useless_transmute,
    clippy::verbose_file_reads,
    clippy::zero_sized_map_values,
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms
)]
// END - Embark standard lints v0.4

//! `priority-bp` fills holes in images with Priority-BP, an exemplar-based
//! image completion algorithm that treats the hole as a Markov random field
//! and solves it with a priority-scheduled min-sum belief propagation.
//!
//! A lattice of overlapping, patch sized nodes is laid over the hole. Every
//! node picks a source patch from the known part of the image so that it
//! agrees both with the known pixels it covers and with its neighbors. The
//! most confident nodes are decided first, and the solve runs from a coarse
//! version of the image down to the original resolution.
//!
//! You build a `Session` via a `SessionBuilder`, which follows the builder
//! pattern. Calling `build` on the `SessionBuilder` loads the input image and
//! its mask and checks for various errors.
//!
//! `Session` has a `run()` method that completes the image, returned as a
//! `CompletedImage`, which can be saved, streamed or inspected.
//!
//! ## Usage
//!
//! ```no_run
//! let session = priority_bp::Session::builder()
//!     // Set some parameters
//!     .patch_size(priority_bp::Dims::square(7))
//!     .pyramid_levels(2)
//!     // Specify the image to complete, and the hole to fill
//!     .input(&"imgs/photo.jpg")
//!     .mask(&"imgs/photo_mask.png")
//!     // Build the session
//!     .build().expect("failed to build session");
//!
//! // Complete the image
//! let completed = session.run(None, None).expect("failed to complete image");
//!
//! // Save it to disk
//! completed.save("completed.png").expect("failed to save image");
//! ```
//!
//! The lower level `complete` function works on already converted
//! `ImageFloat` and `Mask` values instead.
mod compositor;
mod energy;
mod errors;
mod image_float;
mod img_pyramid;
mod label;
mod lattice;
mod layout;
mod mask;
mod node;
mod parallel;
pub mod session;
mod solver;
mod utils;

pub use image;
use std::path::Path;

pub use compositor::{rainbow_color, PatchType};
pub use errors::Error;
pub use image_float::{ImageFloat, Pixel};
pub use img_pyramid::{Downsample, ImagePyramid, Pyramid};
pub use label::Label;
pub use layout::{PatchLayout, PlacedPatch};
pub use mask::{Mask, MaskPyramid, MaskValue};
pub use node::{NeighborEdge, NodeState, Priority};
pub use session::{
    CompletionProgress, ProgressStat, ProgressUpdate, Session, SessionBuilder,
};
pub use solver::{complete, complete_with, CancelToken, Completion};
pub use utils::{load_dynamic_image, ChannelMask, ImageSource};

/// Simple dimensions struct
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Dims {
    pub width: u32,
    pub height: u32,
}

impl Dims {
    pub fn square(size: u32) -> Self {
        Self {
            width: size,
            height: size,
        }
    }
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Everything that controls a completion
#[derive(Clone, Debug)]
pub struct Settings {
    /// Width of a patch, odd and at least 3
    pub patch_width: u32,
    /// Height of a patch, odd and at least 3
    pub patch_height: u32,
    /// Horizontal spacing of the node lattice, at most `patch_width`
    pub lattice_gap_x: u32,
    /// Vertical spacing of the node lattice, at most `patch_height`
    pub lattice_gap_y: u32,
    /// Maximum number of pyramid levels, including the original resolution
    pub pyramid_levels: u32,
    /// Candidates a node keeps when pruning
    pub max_labels_per_node: u32,
    /// Commits between two full message passing passes
    pub pass_interval: u32,
    pub patch_type: PatchType,
    /// Minimum priority for a node to be committed without a refresh pass
    pub confidence_threshold: Option<f32>,
    /// Chebyshev radius of the candidate window around an upsampled label
    pub refine_radius: u32,
    /// Maximum number of threads evaluating energies
    pub max_thread_count: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            patch_width: 9,
            patch_height: 9,
            lattice_gap_x: 4,
            lattice_gap_y: 4,
            pyramid_levels: 3,
            max_labels_per_node: 20,
            pass_interval: 8,
            patch_type: PatchType::Normal,
            confidence_threshold: None,
            refine_radius: 2,
            max_thread_count: num_cpus::get(),
        }
    }
}

impl Settings {
    /// Checks every setting against its allowed range
    pub fn validate(&self) -> Result<(), Error> {
        fn invalid<V: ToString>(
            name: &'static str,
            value: V,
            constraint: &'static str,
        ) -> Result<(), Error> {
            Err(Error::InvalidSettings(errors::InvalidSetting {
                name,
                value: value.to_string(),
                constraint,
            }))
        }

        if self.patch_width < 3 || self.patch_width % 2 == 0 {
            return invalid("patch-width", self.patch_width, "odd and at least 3");
        }

        if self.patch_height < 3 || self.patch_height % 2 == 0 {
            return invalid("patch-height", self.patch_height, "odd and at least 3");
        }

        if self.lattice_gap_x == 0 || self.lattice_gap_x > self.patch_width {
            return invalid(
                "lattice-gap-x",
                self.lattice_gap_x,
                "between 1 and the patch width",
            );
        }

        if self.lattice_gap_y == 0 || self.lattice_gap_y > self.patch_height {
            return invalid(
                "lattice-gap-y",
                self.lattice_gap_y,
                "between 1 and the patch height",
            );
        }

        if self.pyramid_levels == 0 {
            return invalid("pyramid-levels", self.pyramid_levels, "at least 1");
        }

        if self.max_labels_per_node == 0 {
            return invalid("max-labels-per-node", self.max_labels_per_node, "at least 1");
        }

        if self.pass_interval == 0 {
            return invalid("pass-interval", self.pass_interval, "at least 1");
        }

        if let Some(threshold) = self.confidence_threshold {
            if !threshold.is_finite() {
                return invalid("confidence-threshold", threshold, "a finite number");
            }
        }

        if self.max_thread_count == 0 {
            return invalid("max-thread-count", self.max_thread_count, "at least 1");
        }

        Ok(())
    }

    #[inline]
    pub(crate) fn patch_dims(&self) -> Dims {
        Dims::new(self.patch_width, self.patch_height)
    }

    #[inline]
    pub(crate) fn gap_dims(&self) -> Dims {
        Dims::new(self.lattice_gap_x, self.lattice_gap_y)
    }
}

/// An image completed by a `Session::run()`
pub struct CompletedImage {
    image: image::RgbaImage,
    // kept to render debug views of the layout
    source: ImageFloat,
    mask: Mask,
    layout: PatchLayout,
}

impl CompletedImage {
    /// Saves the completed image to the specified path
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let path = path.as_ref();
        if let Some(parent_path) = path.parent() {
            std::fs::create_dir_all(&parent_path)?;
        }

        self.image.save(&path)?;
        Ok(())
    }

    /// Writes the completed image to the specified stream
    pub fn write<W: std::io::Write>(
        self,
        writer: &mut W,
        fmt: image::ImageOutputFormat,
    ) -> Result<(), Error> {
        let dyn_img = self.into_image();
        Ok(dyn_img.write_to(writer, fmt)?)
    }

    /// Saves debug information: the patches painted in a rainbow by the order
    /// they were committed in, and the mask as it was understood, with the
    /// hole in black and ignored pixels in gray.
    pub fn save_debug<P: AsRef<Path>>(&self, dir: P) -> Result<(), Error> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(&dir)?;

        self.layout
            .apply(&self.source, &self.mask, PatchType::DebugPatchOrder)?
            .to_rgba()
            .save(&dir.join("patch_order.png"))?;

        let mask_view = image::GrayImage::from_fn(self.mask.width(), self.mask.height(), |x, y| {
            image::Luma([match self.mask.get(x, y) {
                MaskValue::Known => 255,
                MaskValue::Ignored => 128,
                MaskValue::Unknown => 0,
            }])
        });
        mask_view.save(&dir.join("mask.png"))?;

        Ok(())
    }

    /// The placement of every patch used to fill the hole, which can be
    /// applied to a different image of the same size.
    ///
    /// ```no_run
    /// use priority_bp as pbp;
    ///
    /// let session = pbp::Session::builder()
    ///     .input(&"imgs/albedo.png")
    ///     .mask(&"imgs/mask.png")
    ///     .build().unwrap();
    ///
    /// let completed = session.run(None, None).unwrap();
    ///
    /// // now we can complete the normal map the exact same way
    /// let normals = pbp::ImageFloat::from_rgba(
    ///     &pbp::image::open("imgs/normals.png").unwrap().to_rgba(),
    /// ).unwrap();
    /// let mask = pbp::Mask::from_image(
    ///     &pbp::image::open("imgs/mask.png").unwrap().to_rgba(),
    /// ).unwrap();
    ///
    /// let completed_normals = completed
    ///     .layout()
    ///     .apply(&normals, &mask, pbp::PatchType::Normal)
    ///     .unwrap();
    /// ```
    pub fn layout(&self) -> &PatchLayout {
        &self.layout
    }

    /// Returns the completed output image
    pub fn into_image(self) -> image::DynamicImage {
        image::DynamicImage::ImageRgba8(self.image)
    }
}

impl AsRef<image::RgbaImage> for CompletedImage {
    fn as_ref(&self) -> &image::RgbaImage {
        &self.image
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn settings_ranges() {
        let check = |f: &dyn Fn(&mut Settings), name: &str| {
            let mut settings = Settings::default();
            f(&mut settings);
            match settings.validate() {
                Err(Error::InvalidSettings(is)) => assert_eq!(is.name, name),
                other => panic!("expected {} to be rejected, got {:?}", name, other),
            }
        };

        check(&|s| s.patch_width = 8, "patch-width");
        check(&|s| s.patch_height = 1, "patch-height");
        check(&|s| s.lattice_gap_x = 10, "lattice-gap-x");
        check(&|s| s.lattice_gap_y = 0, "lattice-gap-y");
        check(&|s| s.pyramid_levels = 0, "pyramid-levels");
        check(&|s| s.max_labels_per_node = 0, "max-labels-per-node");
        check(&|s| s.pass_interval = 0, "pass-interval");
        check(&|s| s.confidence_threshold = Some(std::f32::NAN), "confidence-threshold");
        check(&|s| s.max_thread_count = 0, "max-thread-count");

        // a gap equal to the patch size is allowed, patches then only touch
        let settings = Settings {
            lattice_gap_x: 9,
            lattice_gap_y: 9,
            ..Settings::default()
        };
        settings.validate().unwrap();
    }
}
