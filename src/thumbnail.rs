use eframe::egui::ColorImage;

/// Downloads and decodes the preview image named in the probed metadata.
pub fn fetch_thumbnail(url: &str) -> Option<ColorImage> {
    // Perform a blocking HTTP GET request, returning None on any error
    let resp = reqwest::blocking::get(url).ok()?.error_for_status().ok()?.bytes().ok()?;
    decode(&resp)
}

/// Loads image bytes into an egui image, RGBA without premultiplied alpha
fn decode(bytes: &[u8]) -> Option<ColorImage> {
    let img = image::load_from_memory(bytes).ok()?.to_rgba8();
    let size = [img.width() as usize, img.height() as usize];
    Some(ColorImage::from_rgba_unmultiplied(size, &img))
}
