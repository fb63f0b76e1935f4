use anyhow::{anyhow, Result};

/// Raw layouts a camera may negotiate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CameraFormat {
    Rgb24,
    Nv12,
    Yuyv,
}

impl CameraFormat {
    pub(crate) fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(Self::Rgb24),
            b"NV12" => Some(Self::Nv12),
            b"YUYV" => Some(Self::Yuyv),
            _ => None,
        }
    }
}

/// Convert a captured buffer into packed RGB.
pub(crate) fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: CameraFormat,
) -> Result<Vec<u8>> {
    match format {
        CameraFormat::Rgb24 => {
            let expected = width
                .checked_mul(height)
                .and_then(|v| v.checked_mul(3))
                .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))? as usize;
            if pixels.len() < expected {
                return Err(anyhow!(
                    "RGB frame length mismatch: expected {}, got {}",
                    expected,
                    pixels.len()
                ));
            }
            Ok(pixels[..expected].to_vec())
        }
        CameraFormat::Nv12 => nv12_to_rgb(pixels, width, height),
        CameraFormat::Yuyv => yuyv_to_rgb(pixels, width, height),
    }
}

fn nv12_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    let y_plane = w
        .checked_mul(h)
        .ok_or_else(|| anyhow!("NV12 frame dimensions overflow"))?;
    let expected = y_plane
        .checked_add(y_plane / 2)
        .ok_or_else(|| anyhow!("NV12 frame dimensions overflow"))?;
    if pixels.len() < expected {
        return Err(anyhow!(
            "NV12 frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }

    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            let u = pixels[uv_index] as f32 - 128.0;
            let v = pixels[uv_index + 1] as f32 - 128.0;
            write_rgb(&mut rgb, (j * w + i) * 3, y, u, v);
        }
    }

    Ok(rgb)
}

/// Packed 4:2:2, two pixels per `Y0 U Y1 V` quad.
fn yuyv_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    let count = w
        .checked_mul(h)
        .ok_or_else(|| anyhow!("YUYV frame dimensions overflow"))?;
    if w % 2 != 0 {
        return Err(anyhow!("YUYV frame width {} must be even", w));
    }
    if pixels.len() < count * 2 {
        return Err(anyhow!(
            "YUYV frame length mismatch: expected {}, got {}",
            count * 2,
            pixels.len()
        ));
    }

    let mut rgb = vec![0u8; count * 3];
    for (pair, quad) in pixels[..count * 2].chunks_exact(4).enumerate() {
        let u = quad[1] as f32 - 128.0;
        let v = quad[3] as f32 - 128.0;
        write_rgb(&mut rgb, pair * 6, quad[0] as f32, u, v);
        write_rgb(&mut rgb, pair * 6 + 3, quad[2] as f32, u, v);
    }

    Ok(rgb)
}

fn write_rgb(out: &mut [u8], offset: usize, y: f32, u: f32, v: f32) {
    let r = y + 1.402_f32 * v;
    let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
    let b = y + 1.772_f32 * u;
    out[offset] = clamp_to_u8(r);
    out[offset + 1] = clamp_to_u8(g);
    out[offset + 2] = clamp_to_u8(b);
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
