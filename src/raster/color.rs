//! Packed RGBA colors and uniform-region detection.
//!
//! Colors are packed as `0xRRGGBBAA`: red in the top byte, alpha in the
//! bottom byte. Pure-color tiles are named by the uppercase 8-hex-digit
//! rendering of this value, so the packing order here must match every
//! site that formats or parses a tile token.

/// Pack RGBA channels into a `0xRRGGBBAA` value.
#[inline]
pub fn pack_rgba(r: u8, g: u8, b: u8, a: u8) -> u32 {
    (u32::from(r) << 24) | (u32::from(g) << 16) | (u32::from(b) << 8) | u32::from(a)
}

/// Unpack a `0xRRGGBBAA` value into `[r, g, b, a]`.
#[inline]
pub fn unpack_rgba(color: u32) -> [u8; 4] {
    [
        (color >> 24) as u8,
        (color >> 16) as u8,
        (color >> 8) as u8,
        color as u8,
    ]
}

/// Read the packed color of pixel `(x, y)` from a tightly packed RGBA
/// buffer of row width `image_width`.
///
/// Bounds are the caller's responsibility; coordinates outside the buffer
/// panic rather than clip.
#[inline]
pub fn pixel_at(pixels: &[u8], image_width: i32, x: i32, y: i32) -> u32 {
    let offset = ((y * image_width + x) as usize) * 4;
    pack_rgba(
        pixels[offset],
        pixels[offset + 1],
        pixels[offset + 2],
        pixels[offset + 3],
    )
}

/// Compare two packed colors under a per-channel tolerance.
///
/// Tolerance 0 means exact equality; otherwise every channel (including
/// alpha) must differ by at most `tolerance`.
#[inline]
pub fn colors_match(a: u32, b: u32, tolerance: u8) -> bool {
    if tolerance == 0 {
        return a == b;
    }
    let pa = unpack_rgba(a);
    let pb = unpack_rgba(b);
    pa.iter()
        .zip(pb.iter())
        .all(|(&ca, &cb)| ca.abs_diff(cb) <= tolerance)
}

/// Test whether the `w` x `h` region at `(x, y)` is uniform within
/// `tolerance`, returning the reference color (the first pixel) on success.
///
/// The region must lie entirely inside the image; this predicate does not
/// clip.
pub fn uniform_color(
    pixels: &[u8],
    image_width: i32,
    x: i32,
    y: i32,
    w: i32,
    h: i32,
    tolerance: u8,
) -> Option<u32> {
    if pixels.is_empty() || w <= 0 || h <= 0 {
        return None;
    }

    let reference = pixel_at(pixels, image_width, x, y);
    for dy in 0..h {
        for dx in 0..w {
            if !colors_match(pixel_at(pixels, image_width, x + dx, y + dy), reference, tolerance) {
                return None;
            }
        }
    }

    Some(reference)
}

/// Format a packed color as the 8-hex-digit pure-color tile token.
#[inline]
pub fn format_color_token(color: u32) -> String {
    format!("{color:08X}")
}

/// Test whether a tile file token names a pure-color tile
/// (exactly 8 hex digits, either case).
#[inline]
pub fn is_color_token(token: &str) -> bool {
    token.len() == 8 && token.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Parse a pure-color tile token back into its packed color.
#[inline]
pub fn parse_color_token(token: &str) -> Option<u32> {
    if !is_color_token(token) {
        return None;
    }
    u32::from_str_radix(token, 16).ok()
}
