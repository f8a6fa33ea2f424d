use structopt::StructOpt;

mod progress;

use priority_bp::{
    image::ImageOutputFormat as ImgFmt, ChannelMask, CompletionProgress, Dims,
    Error, PatchType, Session,
};
use progress::ProgressBars;
use std::path::PathBuf;

fn parse_size(input: &str) -> Result<Dims, std::num::ParseIntError> {
    let mut i = input.splitn(2, 'x');

    let x: u32 = i.next().unwrap_or("").parse()?;
    let y: u32 = match i.next() {
        Some(num) => num.parse()?,
        None => x,
    };
    Ok(Dims::new(x, y))
}

fn parse_img_fmt(input: &str) -> Result<ImgFmt, String> {
    let fmt = match input {
        "png" => ImgFmt::Png,
        "jpg" => ImgFmt::Jpeg(75),
        "bmp" => ImgFmt::Bmp,
        other => {
            return Err(format!(
                "image format `{}` not one of: 'png', 'jpg', 'bmp'",
                other
            ))
        }
    };

    Ok(fmt)
}

#[derive(StructOpt)]
#[structopt(rename_all = "kebab-case")]
struct Tweaks {
    /// Size of the patches copied into the hole, in `width x height`, or a single
    /// number for both dimensions. Both dimensions must be odd.
    #[structopt(long, default_value = "9", parse(try_from_str = parse_size))]
    patch_size: Dims,
    /// Spacing between the lattice nodes placed over the hole, must not exceed the
    /// patch size.
    #[structopt(long, default_value = "4", parse(try_from_str = parse_size))]
    lattice_gap: Dims,
    /// The maximum number of pyramid levels, coarser levels capture larger structures
    #[structopt(long, default_value = "3")]
    levels: u32,
    /// The number of candidate patches a node keeps once it's been pruned
    #[structopt(long, default_value = "20")]
    max_labels: u32,
    /// The number of committed nodes between full message passing passes
    #[structopt(long, default_value = "8")]
    pass_interval: u32,
    /// Nodes less confident than this get an extra message passing pass before
    /// being committed. Priorities are negated entropies, so this is <= 0.
    #[structopt(long, allow_hyphen_values = true)]
    confidence: Option<f32>,
    /// How far around its coarse patch a node searches on the next finer level
    #[structopt(long, default_value = "2")]
    refine_radius: u32,
    /// Paint every patch as a solid color, from red for the first committed
    /// patch to violet for the last one
    #[structopt(long)]
    debug_patch_order: bool,
    /// Don't show progress bars
    #[structopt(long)]
    no_progress: bool,
}

#[derive(StructOpt)]
#[structopt(
    name = "priority-bp",
    about = "Fills the holes of images with patches copied from their known parts",
    rename_all = "kebab-case"
)]
struct Opt {
    /// Path to the mask image, where black pixels are filled, white pixels are kept
    /// and used as sources, and gray pixels are kept but never used as sources
    #[structopt(long, parse(from_os_str), required_unless = "mask-channel")]
    mask: Option<PathBuf>,
    /// Uses a channel of the input as the mask instead, pixels whose channel is
    /// below half intensity are filled. One of `r`, `g`, `b`, `a`.
    #[structopt(long, conflicts_with = "mask")]
    mask_channel: Option<ChannelMask>,
    /// The format to save the completed image as.
    ///
    /// NOTE: this will only apply when stdout is specified via `-o -`, otherwise the image
    /// format is determined by the file extension of the path provided to `-o`
    #[structopt(
        long,
        default_value = "png",
        parse(try_from_str = parse_img_fmt)
    )]
    out_fmt: ImgFmt,
    /// The path to save the completed image to, the file extensions of the path determines
    /// the image format used. You may use `-` for stdout.
    #[structopt(long = "out", short, parse(from_os_str))]
    output_path: PathBuf,
    /// Saves the placement of every patch, which can be applied to another
    /// image of the same size
    #[structopt(long, parse(from_os_str))]
    layout_out: Option<PathBuf>,
    /// A directory into which debug images are also saved.
    ///
    /// * `patch_order.png` - The patches painted in the order they were committed
    /// * `mask.png` - The mask as it was understood, with ignored pixels in gray
    #[structopt(long, parse(from_os_str))]
    debug_out_dir: Option<PathBuf>,
    /// The maximum number of worker threads that can be active at any one time
    /// while evaluating energies. Defaults to the logical core count.
    #[structopt(short = "t", long = "threads")]
    max_threads: Option<usize>,
    #[structopt(flatten)]
    tweaks: Tweaks,
    /// Path to the image to complete
    #[structopt(parse(from_os_str))]
    input: PathBuf,
}

fn main() {
    env_logger::init();

    if let Err(e) = real_main() {
        if atty::is(atty::Stream::Stderr) {
            eprintln!("\x1b[31merror\x1b[0m: {}", e);
        } else {
            eprintln!("error: {}", e);
        }

        std::process::exit(1);
    }
}

fn real_main() -> Result<(), Error> {
    let args = Opt::from_args();

    // Check that the extension for the path supplied by the user is one of the ones we support
    {
        match args.output_path.extension().and_then(|ext| ext.to_str()) {
            Some("png") | Some("jpg") | Some("bmp") => {}
            None => {}
            Some(other) => return Err(Error::UnsupportedOutputFormat(other.to_owned())),
        }
    }

    let mut sb = Session::builder()
        .input(&args.input)
        .patch_size(args.tweaks.patch_size)
        .lattice_gap(args.tweaks.lattice_gap)
        .pyramid_levels(args.tweaks.levels)
        .max_labels_per_node(args.tweaks.max_labels)
        .pass_interval(args.tweaks.pass_interval)
        .refine_radius(args.tweaks.refine_radius);

    sb = match (&args.mask, args.mask_channel) {
        (_, Some(channel)) => sb.mask_channel(channel),
        (Some(mask), None) => sb.mask(mask),
        (None, None) => return Err(Error::MissingInput("mask")),
    };

    if args.tweaks.debug_patch_order {
        sb = sb.patch_type(PatchType::DebugPatchOrder);
    }

    if let Some(threshold) = args.tweaks.confidence {
        sb = sb.confidence_threshold(threshold);
    }

    if let Some(mt) = args.max_threads {
        sb = sb.max_thread_count(mt);
    }

    let session = sb.build()?;

    let progress: Option<Box<dyn CompletionProgress>> = if !args.tweaks.no_progress {
        Some(Box::new(ProgressBars::new()))
    } else {
        None
    };

    let completed = session.run(progress, None)?;

    if let Some(ref dir) = args.debug_out_dir {
        completed.save_debug(dir)?;
    }

    if let Some(ref path) = args.layout_out {
        let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
        let written = completed.layout().write(&mut file)?;
        log::info!("wrote a {} byte layout to {}", written, path.display());
    }

    if args.output_path.to_str() == Some("-") {
        let out = std::io::stdout();
        let mut out = out.lock();
        completed.write(&mut out, args.out_fmt)?;
    } else {
        // As with the debug images, the format follows the extension
        completed.save(&args.output_path)?;
    }

    Ok(())
}
