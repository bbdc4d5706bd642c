/// Utility functions for corner detection algorithms

/// Check if there are at least `min_count` consecutive set bits in the
/// circular 16-bit mask (bit `i` = circle pixel `i`).
pub fn has_contiguous_arc(mask: u16, min_count: usize) -> bool {
    if min_count > 16 || min_count == 0 {
        return false;
    }
    if mask == u16::MAX {
        return true;
    }

    // A run of length n survives n-1 rotate-and-mask steps
    let mut test_mask = mask;
    for i in 1..min_count as u32 {
        test_mask &= mask.rotate_right(i);
        if test_mask == 0 {
            return false;
        }
    }

    test_mask != 0
}

/// Pack a boolean circle into the mask layout used by [`has_contiguous_arc`]
pub fn circle_mask(pixels: &[bool; 16]) -> u16 {
    pixels
        .iter()
        .enumerate()
        .fold(0u16, |mask, (i, &p)| if p { mask | (1 << i) } else { mask })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn longest_run(pixels: &[bool; 16]) -> usize {
        let mut best = 0;
        let mut current = 0;
        for i in 0..32 {
            if pixels[i % 16] {
                current += 1;
                best = best.max(current.min(16));
            } else {
                current = 0;
            }
        }
        best
    }

    #[test]
    fn test_consecutive_pixels_simple() {
        let mut pixels = [false; 16];
        for p in pixels.iter_mut().take(9) {
            *p = true;
        }
        assert!(has_contiguous_arc(circle_mask(&pixels), 9));
        assert!(!has_contiguous_arc(circle_mask(&pixels), 10));
    }

    #[test]
    fn test_consecutive_pixels_wrap_around() {
        let mut pixels = [false; 16];
        for p in pixels.iter_mut().skip(12) {
            *p = true;
        }
        for p in pixels.iter_mut().take(5) {
            *p = true;
        }
        assert!(has_contiguous_arc(circle_mask(&pixels), 9));
    }

    #[test]
    fn test_alternating_pixels() {
        let mut pixels = [false; 16];
        for i in (0..16).step_by(2) {
            pixels[i] = true;
        }
        assert!(!has_contiguous_arc(circle_mask(&pixels), 2));
        assert!(has_contiguous_arc(circle_mask(&pixels), 1));
    }

    proptest! {
        #[test]
        fn bitmask_agrees_with_run_length(bits in any::<u16>(), min_count in 1usize..=16) {
            let mut pixels = [false; 16];
            for (i, p) in pixels.iter_mut().enumerate() {
                *p = bits & (1 << i) != 0;
            }
            prop_assert_eq!(
                has_contiguous_arc(circle_mask(&pixels), min_count),
                longest_run(&pixels) >= min_count
            );
        }
    }
}
