use priority_bp as pbp;

/// A brick wall, drawn so the example doesn't need any image on disk
fn bricks(width: u32, height: u32) -> image::RgbaImage {
    image::RgbaImage::from_fn(width, height, |x, y| {
        let row = y / 12;
        let x = x + if row % 2 == 0 { 0 } else { 12 };

        if y % 12 < 2 || x % 24 < 2 {
            // mortar
            image::Rgba([200, 200, 190, 255])
        } else {
            let shade = ((x / 24 * 37 + row * 53) % 40) as u8;
            image::Rgba([150 + shade, 60 + shade / 2, 40, 255])
        }
    })
}

fn main() -> Result<(), pbp::Error> {
    let input = bricks(160, 120);

    // black is the hole to fill, white is kept
    let mask = image::RgbaImage::from_fn(160, 120, |x, y| {
        let (dx, dy) = (x as i32 - 80, y as i32 - 60);
        if dx * dx + dy * dy < 25 * 25 {
            image::Rgba([0, 0, 0, 255])
        } else {
            image::Rgba([255, 255, 255, 255])
        }
    });

    let session = pbp::Session::builder()
        .input(input)
        .mask(mask)
        .patch_size(pbp::Dims::square(9))
        .lattice_gap(pbp::Dims::square(4))
        .build()?;

    let completed = session.run(
        Some(Box::new(|update: pbp::ProgressUpdate| {
            println!(
                "level {}/{}: {}/{} nodes",
                update.total.current + 1,
                update.total.total,
                update.stage.current,
                update.stage.total
            );
        })),
        None,
    )?;

    // shows which patch went where, and in which order
    completed.save_debug("out/01_debug")?;

    completed.save("out/01.png")
}
