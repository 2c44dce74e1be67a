use anyhow::{Context, Result};
use image::{codecs::png::PngEncoder, ExtendedColorType, ImageEncoder};

const SHADES: &[u8] = b" .:-=+*#%@";

fn check_len(width: usize, height: usize, pixels: &[f32]) -> Result<()> {
    if pixels.len() != width * height {
        anyhow::bail!(
            "pixel buffer length {} does not match image size {}x{}",
            pixels.len(),
            width,
            height
        );
    }
    Ok(())
}

fn to_luma(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Encode a grayscale image (values in [0, 1]) as PNG bytes.
pub fn encode_luma_png(width: u32, height: u32, pixels: &[f32]) -> Result<Vec<u8>> {
    check_len(width as usize, height as usize, pixels)?;

    let encoded: Vec<u8> = pixels.iter().copied().map(to_luma).collect();

    let mut buffer = Vec::new();
    PngEncoder::new(&mut buffer)
        .write_image(&encoded, width, height, ExtendedColorType::L8)
        .context("failed to encode PNG data")?;

    Ok(buffer)
}

/// Render a grayscale image as text, one character per pixel.
pub fn render_terminal_preview(width: usize, pixels: &[f32]) -> Result<String> {
    if width == 0 || pixels.len() % width != 0 {
        anyhow::bail!(
            "pixel buffer length {} is not a whole number of {}-pixel rows",
            pixels.len(),
            width
        );
    }

    let mut output = String::with_capacity(pixels.len() + pixels.len() / width);
    for row in pixels.chunks_exact(width) {
        for &value in row {
            let shade = (value.clamp(0.0, 1.0) * (SHADES.len() - 1) as f32).round() as usize;
            output.push(SHADES[shade] as char);
        }
        output.push('\n');
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_round_trips_through_image_crate() {
        let pixels = [0.0, 1.0, 0.5, 0.25];
        let bytes = encode_luma_png(2, 2, &pixels).unwrap();

        let decoded = image::load_from_memory(&bytes).unwrap().into_luma8();
        assert_eq!(decoded.dimensions(), (2, 2));
        assert_eq!(decoded.as_raw(), &vec![0, 255, 128, 64]);
    }

    #[test]
    fn png_rejects_wrong_length() {
        assert!(encode_luma_png(28, 28, &[0.0; 10]).is_err());
    }

    #[test]
    fn preview_maps_intensity_to_shades() {
        let preview = render_terminal_preview(3, &[0.0, 0.5, 1.0, 1.0, 0.0, 0.0]).unwrap();
        assert_eq!(preview, " +@\n@  \n");
    }

    #[test]
    fn preview_rejects_ragged_rows() {
        assert!(render_terminal_preview(4, &[0.0; 6]).is_err());
        assert!(render_terminal_preview(0, &[]).is_err());
    }
}
