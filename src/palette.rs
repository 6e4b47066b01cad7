use image::Rgb;

use crate::errors::{Result, SegMaskError};

/// Class colors, indexed by class id. Pascal VOC colors, with the last entry white.
pub const PALETTE: [Rgb<u8>; 22] = [
    Rgb([0x00, 0x00, 0x00]),
    Rgb([0x80, 0x00, 0x00]),
    Rgb([0x00, 0x80, 0x00]),
    Rgb([0x80, 0x80, 0x00]),
    Rgb([0x00, 0x00, 0x80]),
    Rgb([0x80, 0x00, 0x80]),
    Rgb([0x00, 0x80, 0x80]),
    Rgb([0x80, 0x80, 0x80]),
    Rgb([0x40, 0x00, 0x00]),
    Rgb([0xc0, 0x00, 0x00]),
    Rgb([0x40, 0x80, 0x00]),
    Rgb([0xc0, 0x80, 0x00]),
    Rgb([0x40, 0x00, 0x80]),
    Rgb([0xc0, 0x00, 0x80]),
    Rgb([0x40, 0x80, 0x80]),
    Rgb([0xc0, 0x80, 0x80]),
    Rgb([0x00, 0x40, 0x00]),
    Rgb([0x80, 0x40, 0x00]),
    Rgb([0x00, 0xc0, 0x00]),
    Rgb([0x80, 0xc0, 0x00]),
    Rgb([0x00, 0x80, 0x40]),
    Rgb([0xff, 0xff, 0xff]),
];

/// Looks up the color of a class, rejecting ids past the end of the palette.
pub fn color_of(class: u32) -> Result<Rgb<u8>> {
    PALETTE
        .get(class as usize)
        .copied()
        .ok_or(SegMaskError::PaletteBounds {
            index: class,
            palette_len: PALETTE.len(),
        })
}

/// Inverse lookup, mostly useful to check rendered output.
pub fn class_of(color: Rgb<u8>) -> Option<u32> {
    PALETTE.iter().position(|&c| c == color).map(|i| i as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_entry_is_white() -> Result<()> {
        assert_eq!(color_of(21)?, Rgb([0xff, 0xff, 0xff]));
        Ok(())
    }

    #[test]
    fn colors_are_distinct() {
        for (i, a) in PALETTE.iter().enumerate() {
            for b in &PALETTE[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn out_of_range_class_is_rejected() {
        assert!(matches!(
            color_of(25),
            Err(SegMaskError::PaletteBounds {
                index: 25,
                palette_len: 22
            })
        ));
        assert!(color_of(22).is_err());
    }

    #[test]
    fn class_of_inverts_color_of() -> Result<()> {
        for class in 0..PALETTE.len() as u32 {
            assert_eq!(class_of(color_of(class)?), Some(class));
        }
        assert_eq!(class_of(Rgb([1, 2, 3])), None);
        Ok(())
    }
}
