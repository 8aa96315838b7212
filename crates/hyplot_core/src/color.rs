use serde::{Deserialize, Serialize};

/// 24-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Marker color once a trajectory has run out of samples.
pub const INACTIVE_GRAY: Color = Color::new(198, 198, 198);

/// Color of the range ribbons drawn between neighbouring trajectories.
pub const RIBBON_WHITE: Color = Color::new(255, 255, 255);

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Fully saturated, full value color at `hue` degrees.
    pub fn from_hue(hue: f64) -> Self {
        let h = hue.rem_euclid(360.0) / 60.0;
        let sector = h.floor() as u32;
        let f = h - h.floor();
        let rise = (f * 255.0).round() as u8;
        let fall = ((1.0 - f) * 255.0).round() as u8;
        match sector {
            0 => Color::new(255, rise, 0),
            1 => Color::new(fall, 255, 0),
            2 => Color::new(0, 255, rise),
            3 => Color::new(0, fall, 255),
            4 => Color::new(rise, 0, 255),
            _ => Color::new(255, 0, fall),
        }
    }

    pub fn as_hex24(&self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }
}

/// `count` colors spread evenly around the hue wheel, rotated by `angle`.
/// Index `i` is the color of the `i`-th parameter condition.
pub fn palette(count: usize, angle: f64) -> Vec<Color> {
    if count == 0 {
        return Vec::new();
    }
    let step = 360.0 / count as f64;
    let start = angle.floor();
    (0..count)
        .map(|i| Color::from_hue(((step * i as f64).floor() + start).rem_euclid(360.0)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_hues() {
        assert_eq!(Color::from_hue(0.0), Color::new(255, 0, 0));
        assert_eq!(Color::from_hue(120.0), Color::new(0, 255, 0));
        assert_eq!(Color::from_hue(240.0), Color::new(0, 0, 255));
        assert_eq!(Color::from_hue(360.0), Color::new(255, 0, 0));
    }

    #[test]
    fn hex_encoding() {
        assert_eq!(INACTIVE_GRAY.as_hex24(), 0xC6C6C6);
        assert_eq!(Color::new(0x12, 0x34, 0x56).as_hex24(), 0x123456);
    }

    #[test]
    fn palette_is_deterministic_and_rotated() {
        let colors = palette(3, 0.0);
        assert_eq!(colors, palette(3, 0.0));
        assert_eq!(colors[0], Color::from_hue(0.0));
        assert_eq!(colors[1], Color::from_hue(120.0));
        assert_eq!(colors[2], Color::from_hue(240.0));

        let rotated = palette(2, 120.7);
        assert_eq!(rotated[0], Color::from_hue(120.0));
        assert_eq!(rotated[1], Color::from_hue(300.0));
        assert!(palette(0, 0.0).is_empty());
    }
}
