use std::io::Cursor;

use image::{ImageFormat, Rgba, RgbaImage};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// PNG strip of `layers` square layers, each filled with `colour(layer)`.
pub fn strip_png(size: u32, layers: u32, colour: impl Fn(u32) -> [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_fn(size, size * layers, |_, y| Rgba(colour(y / size)));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("encode png");
    bytes
}

/// Red channel encodes the tile, green the layer.
pub fn tagged_tile(tile: u8, size: u32, layers: u32) -> Vec<u8> {
    strip_png(size, layers, |layer| [tile * 50, layer as u8 * 50, 0, 255])
}

#[cfg(feature = "integration-tests")]
pub async fn headless() -> flow_ribbon::Context {
    flow_ribbon::Context::headless().await.expect("a GPU adapter for integration tests")
}
