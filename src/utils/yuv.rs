//! Packed RGB to semi-planar YUV420 (NV21) conversion
//!
//! Uses the ITU-R BT.601 studio-swing integer approximation: each
//! coefficient is the floating-point matrix entry scaled by 256 and rounded,
//! so `(c_r*R + c_g*G + c_b*B + 128) >> 8` is the rounded fixed-point dot
//! product. Luma then gets +16 and chroma +128 before clamping to a byte.
//!
//! Output layout for effective size W' x H' (odd trailing row/column dropped):
//! - `W' * H'` luma bytes, row-major
//! - one V,U pair per 2x2 block (sampled from its top-left pixel), block
//!   row-major

use crate::error::{ScanError, ScanResult};
use crate::models::{ChromaBuffer, PixelImage};
use rayon::prelude::*;

/// Luma coefficients: 0.257, 0.504, 0.098 scaled by 256
const Y_R: i32 = 66;
const Y_G: i32 = 129;
const Y_B: i32 = 25;

/// Cb coefficients: -0.148, -0.291, 0.439 scaled by 256
const U_R: i32 = -38;
const U_G: i32 = -74;
const U_B: i32 = 112;

/// Cr coefficients: 0.439, -0.368, -0.071 scaled by 256
const V_R: i32 = 112;
const V_G: i32 = -94;
const V_B: i32 = -18;

/// Half of the 256 scale, added before the shift to round to nearest
const ROUND: i32 = 128;
const SHIFT: u32 = 8;

/// Studio-swing black level for luma
const Y_OFFSET: i32 = 16;
/// Zero level for both chroma channels
const UV_OFFSET: i32 = 128;

#[inline]
fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

#[inline]
fn channels(argb: u32) -> (i32, i32, i32) {
    (
        ((argb >> 16) & 0xff) as i32,
        ((argb >> 8) & 0xff) as i32,
        (argb & 0xff) as i32,
    )
}

/// Luma for one packed pixel
#[inline]
pub fn luma(argb: u32) -> u8 {
    let (r, g, b) = channels(argb);
    clamp_u8(((Y_R * r + Y_G * g + Y_B * b + ROUND) >> SHIFT) + Y_OFFSET)
}

/// (U, V) for one packed pixel
#[inline]
pub fn chroma(argb: u32) -> (u8, u8) {
    let (r, g, b) = channels(argb);
    let u = clamp_u8(((U_R * r + U_G * g + U_B * b + ROUND) >> SHIFT) + UV_OFFSET);
    let v = clamp_u8(((V_R * r + V_G * g + V_B * b + ROUND) >> SHIFT) + UV_OFFSET);
    (u, v)
}

/// Even dimensions the converter will produce for a `width x height` source
///
/// Fails with `InvalidGeometry` when either is below 2.
pub fn effective_dims(width: usize, height: usize) -> ScanResult<(usize, usize)> {
    let w = width - width % 2;
    let h = height - height % 2;
    if w < 2 || h < 2 {
        return Err(ScanError::InvalidGeometry { width, height });
    }
    Ok((w, h))
}

/// Convert a packed color image into an NV21 buffer
pub fn convert(image: PixelImage) -> ScanResult<ChromaBuffer> {
    let (w, h) = effective_dims(image.width(), image.height())?;
    let mut bytes = vec![0u8; ChromaBuffer::byte_len(w, h)];
    let (luma_plane, vu_plane) = bytes.split_at_mut(w * h);

    for (pair, (luma_rows, vu_row)) in luma_plane
        .chunks_exact_mut(2 * w)
        .zip(vu_plane.chunks_exact_mut(w))
        .enumerate()
    {
        convert_row_pair(&image, pair * 2, w, luma_rows, vu_row);
    }

    ChromaBuffer::from_raw(w, h, bytes)
}

/// Same output as [`convert`], with row pairs processed in parallel
pub fn convert_parallel(image: PixelImage) -> ScanResult<ChromaBuffer> {
    let (w, h) = effective_dims(image.width(), image.height())?;
    let mut bytes = vec![0u8; ChromaBuffer::byte_len(w, h)];
    let (luma_plane, vu_plane) = bytes.split_at_mut(w * h);

    luma_plane
        .par_chunks_mut(2 * w)
        .zip(vu_plane.par_chunks_mut(w))
        .enumerate()
        .for_each(|(pair, (luma_rows, vu_row))| {
            convert_row_pair(&image, pair * 2, w, luma_rows, vu_row);
        });

    ChromaBuffer::from_raw(w, h, bytes)
}

/// Fill two luma rows and their shared V,U row, starting at source row `y`
fn convert_row_pair(
    image: &PixelImage,
    y: usize,
    w: usize,
    luma_rows: &mut [u8],
    vu_row: &mut [u8],
) {
    let stride = image.width();
    let pixels = image.pixels();

    for dy in 0..2 {
        let src = &pixels[(y + dy) * stride..(y + dy) * stride + w];
        let dst = &mut luma_rows[dy * w..(dy + 1) * w];
        for (out, &px) in dst.iter_mut().zip(src) {
            *out = luma(px);
        }
    }

    let top = &pixels[y * stride..y * stride + w];
    for (pair, &px) in vu_row.chunks_exact_mut(2).zip(top.iter().step_by(2)) {
        let (u, v) = chroma(px);
        pair[0] = v;
        pair[1] = u;
    }
}
