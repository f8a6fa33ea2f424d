use crate::{
    image_float::ImageFloat,
    mask::{Mask, MaskValue},
    solver::{self, CancelToken},
    utils::{load_image, ChannelMask, ImageSource},
    CompletedImage, Dims, Error, PatchType, Settings,
};

/// Image completion session.
///
/// Calling `run()` fills the hole of the input image and returns the result,
/// consuming the session in the process. You can provide a
/// `CompletionProgress` implementation to periodically get updates with the
/// number of nodes that have been committed on the current pyramid level.
///
/// # Example
/// ```no_run
/// let session = priority_bp::Session::builder()
///     .input(&"imgs/photo.jpg")
///     .mask(&"imgs/photo_mask.png")
///     .build().expect("failed to build session");
///
/// let completed = session.run(None, None).expect("failed to complete image");
/// completed.save("completed.png").expect("failed to save image");
/// ```
pub struct Session {
    input: image::RgbaImage,
    image: ImageFloat,
    mask: Mask,
    settings: Settings,
}

impl Session {
    /// Creates a new session with default settings.
    pub fn builder<'a>() -> SessionBuilder<'a> {
        SessionBuilder::default()
    }

    /// Runs the completion, unless `cancel` is raised before it's done.
    pub fn run(
        self,
        mut progress: Option<Box<dyn CompletionProgress>>,
        cancel: Option<&CancelToken>,
    ) -> Result<CompletedImage, Error> {
        let progress = progress
            .as_mut()
            .map(|p| &mut **p as &mut dyn CompletionProgress);

        let completion =
            solver::complete_with(&self.image, &self.mask, &self.settings, progress, cancel)?;

        // Only the hole is replaced, everything else keeps its exact original
        // value, alpha included
        let mut output = self.input;
        for (x, y, px) in output.enumerate_pixels_mut() {
            if self.mask.get(x, y) == MaskValue::Unknown {
                *px = completion.image.pixel(x, y).to_rgba(255);
            }
        }

        Ok(CompletedImage {
            image: output,
            source: self.image,
            mask: self.mask,
            layout: completion.layout,
        })
    }
}

enum MaskSource<'a> {
    Image(ImageSource<'a>),
    Channel(ChannelMask),
}

/// Builds a session by setting parameters and adding the input image and its
/// mask, calling `build` will check all of the provided inputs to verify that
/// the completion can run
#[derive(Default)]
pub struct SessionBuilder<'a> {
    input: Option<ImageSource<'a>>,
    mask: Option<MaskSource<'a>>,
    settings: Settings,
}

impl<'a> SessionBuilder<'a> {
    /// Creates a new `SessionBuilder`, can also be created via
    /// `Session::builder()`
    pub fn new() -> Self {
        Self::default()
    }

    /// The image to complete
    pub fn input<I: Into<ImageSource<'a>>>(mut self, img: I) -> Self {
        self.input = Some(img.into());
        self
    }

    /// The mask marking the hole of the input image. Its dark pixels are
    /// filled, its light pixels are kept and used as sources, and mid grays
    /// are kept but never used as sources.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// let session = priority_bp::Session::builder()
    ///     .input(&"imgs/photo.jpg")
    ///     .mask(&"imgs/photo_mask.png")
    ///     .build().expect("failed to build session");
    /// ```
    pub fn mask<I: Into<ImageSource<'a>>>(mut self, mask: I) -> Self {
        self.mask = Some(MaskSource::Image(mask.into()));
        self
    }

    /// Uses a channel of the input image itself as the mask, pixels whose
    /// channel is below half intensity are filled
    ///
    /// # Examples
    ///
    /// ```no_run
    /// let session = priority_bp::Session::builder()
    ///     // fill the transparent pixels
    ///     .input(&"imgs/sprite.png")
    ///     .mask_channel(priority_bp::ChannelMask::A)
    ///     .build().expect("failed to build session");
    /// ```
    pub fn mask_channel(mut self, channel: ChannelMask) -> Self {
        self.mask = Some(MaskSource::Channel(channel));
        self
    }

    /// Replaces every setting at once
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Size of the patches copied into the hole, both dimensions must be odd
    /// and at least 3.
    ///
    /// Default: 9x9
    pub fn patch_size(mut self, dims: Dims) -> Self {
        self.settings.patch_width = dims.width;
        self.settings.patch_height = dims.height;
        self
    }

    /// Spacing of the node lattice. Must not exceed the patch size, so that
    /// neighboring patches overlap or at least touch.
    ///
    /// Default: 4x4
    pub fn lattice_gap(mut self, dims: Dims) -> Self {
        self.settings.lattice_gap_x = dims.width;
        self.settings.lattice_gap_y = dims.height;
        self
    }

    /// Maximum number of pyramid levels, `1` solves at full resolution only.
    ///
    /// Default: 3
    pub fn pyramid_levels(mut self, levels: u32) -> Self {
        self.settings.pyramid_levels = levels;
        self
    }

    /// How many candidate patches a node keeps when it prunes.
    ///
    /// Default: 20
    pub fn max_labels_per_node(mut self, count: u32) -> Self {
        self.settings.max_labels_per_node = count;
        self
    }

    /// Number of commits between full message passing passes.
    ///
    /// Default: 8
    pub fn pass_interval(mut self, commits: u32) -> Self {
        self.settings.pass_interval = commits;
        self
    }

    pub fn patch_type(mut self, patch_type: PatchType) -> Self {
        self.settings.patch_type = patch_type;
        self
    }

    /// A node whose priority is below this is only committed after an extra
    /// full pass had a chance to make it more confident. Priorities are
    /// negated entropies, so the threshold is `<= 0`.
    ///
    /// Default: None
    pub fn confidence_threshold(mut self, threshold: f32) -> Self {
        self.settings.confidence_threshold = Some(threshold);
        self
    }

    /// How far around its upsampled coarse label a node looks for candidates
    /// on the next finer level.
    ///
    /// Default: 2
    pub fn refine_radius(mut self, radius: u32) -> Self {
        self.settings.refine_radius = radius;
        self
    }

    /// How many threads can be used to evaluate energies. The result is the
    /// same for any thread count.
    ///
    /// Default: The number of logical cores on this system.
    pub fn max_thread_count(mut self, count: usize) -> Self {
        self.settings.max_thread_count = count;
        self
    }

    /// Creates a `Session`, or returns an error if invalid settings or input
    /// images were specified.
    pub fn build(self) -> Result<Session, Error> {
        self.settings.validate()?;

        let input = self.input.ok_or(Error::MissingInput("input image"))?;
        let input = load_image(input)?;

        let mask = match self.mask.ok_or(Error::MissingInput("mask"))? {
            MaskSource::Image(src) => {
                let mask_img = load_image(src)?;
                if mask_img.dimensions() != input.dimensions() {
                    return Err(Error::DimensionMismatch(crate::errors::SizeMismatch {
                        image: input.dimensions(),
                        mask: mask_img.dimensions(),
                    }));
                }

                Mask::from_image(&mask_img)?
            }
            MaskSource::Channel(channel) => Mask::from_channel(&input, channel)?,
        };

        let image = ImageFloat::from_rgba(&input)?;

        log::debug!(
            "loaded a {}x{} input with {} unknown and {} ignored pixels",
            input.width(),
            input.height(),
            mask.count(MaskValue::Unknown),
            mask.count(MaskValue::Ignored)
        );

        Ok(Session {
            input,
            image,
            mask,
            settings: self.settings,
        })
    }
}

/// Helper struct for passing progress information to external callers
#[derive(Copy, Clone, Debug)]
pub struct ProgressStat {
    /// The current amount of work that has been done
    pub current: usize,
    /// The total amount of work to do
    pub total: usize,
}

/// The current state of the solver
#[derive(Copy, Clone, Debug)]
pub struct ProgressUpdate {
    /// Pyramid levels done out of the levels to solve
    pub total: ProgressStat,
    /// Nodes committed out of the nodes of the current level
    pub stage: ProgressStat,
}

/// Allows the solver to update external callers with the current
/// progress of the completion
pub trait CompletionProgress {
    fn update(&mut self, info: ProgressUpdate);
}

impl<G> CompletionProgress for G
where
    G: FnMut(ProgressUpdate) + Send,
{
    fn update(&mut self, info: ProgressUpdate) {
        self(info)
    }
}
