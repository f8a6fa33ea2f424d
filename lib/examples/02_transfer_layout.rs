use priority_bp as pbp;

fn stripes(width: u32, height: u32, period: u32) -> image::RgbaImage {
    image::RgbaImage::from_fn(width, height, |x, y| {
        let v = if (x + y / 2) % period < period / 2 { 230 } else { 30 };
        // the transparent square is the hole
        let alpha = if (40..70).contains(&x) && (30..60).contains(&y) {
            0
        } else {
            255
        };
        image::Rgba([v, v / 2, 255 - v, alpha])
    })
}

fn main() -> Result<(), pbp::Error> {
    let albedo = stripes(120, 90, 10);

    // the hole comes from the alpha channel of the input itself
    let session = pbp::Session::builder()
        .input(albedo.clone())
        .mask_channel(pbp::ChannelMask::A)
        .build()?;

    let completed = session.run(None, None)?;
    completed.save("out/02_albedo.png")?;

    // a second image of the same size, eg. a normal map, is completed with the
    // exact same patches without solving again
    let mut normals = albedo.clone();
    for px in normals.pixels_mut() {
        let slope = if px[0] > 128 { 200 } else { 90 };
        *px = image::Rgba([slope, 128, 255, px[3]]);
    }
    let normals_img = pbp::ImageFloat::from_rgba(&normals)?;
    let mask = pbp::Mask::from_channel(&albedo, pbp::ChannelMask::A)?;

    let mut saved = Vec::new();
    completed.layout().write(&mut saved)?;
    let layout = pbp::PatchLayout::read(&mut std::io::Cursor::new(&saved))?;

    layout
        .apply(&normals_img, &mask, pbp::PatchType::Normal)?
        .to_rgba()
        .save("out/02_normals.png")?;

    Ok(())
}
