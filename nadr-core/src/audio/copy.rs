//! Fixed-cost copy primitive
//!
//! Copies run a main loop of 128-byte blocks, then finish the tail with a
//! fixed number of window copies chosen by size class. Each class copies two
//! overlapping windows anchored at the start and end of the tail, so a 70-byte
//! tail costs exactly the same as a 127-byte tail:
//!
//! | tail      | windows                 |
//! |-----------|-------------------------|
//! | 64..=127  | 64 @ start, 64 @ end    |
//! | 32..=63   | 32 @ start, 32 @ end    |
//! | 16..=31   | 16 @ start, 16 @ end    |
//! | 8..=15    | 8 @ start, 8 @ end      |
//! | 4..=7     | 4 @ start, 4 @ end      |
//! | 1..=3     | first, middle, last     |
//!
//! Copies above [`BULK_COPY_THRESHOLD`] go straight to the general bulk copy.

use nadr_common::params::{BULK_COPY_THRESHOLD, COPY_BLOCK};

/// Copy `min(dst.len(), src.len())` bytes from `src` to `dst`
///
/// Returns the number of bytes copied. Total: never panics for any lengths.
#[inline]
pub fn copy(dst: &mut [u8], src: &[u8]) -> usize {
    let n = dst.len().min(src.len());
    let dst = &mut dst[..n];
    let src = &src[..n];

    if n > BULK_COPY_THRESHOLD {
        dst.copy_from_slice(src);
        return n;
    }

    let blocks = n / COPY_BLOCK;
    let (dst_blocks, dst_tail) = dst.split_at_mut(blocks * COPY_BLOCK);
    let (src_blocks, src_tail) = src.split_at(blocks * COPY_BLOCK);

    for (d, s) in dst_blocks
        .chunks_exact_mut(COPY_BLOCK)
        .zip(src_blocks.chunks_exact(COPY_BLOCK))
    {
        copy_window::<COPY_BLOCK>(d, s, 0);
    }

    copy_tail(dst_tail, src_tail);
    n
}

/// Copy a tail shorter than one block
#[inline(always)]
fn copy_tail(dst: &mut [u8], src: &[u8]) {
    let len = src.len();
    debug_assert!(len < COPY_BLOCK);

    match len {
        64.. => copy_pair::<64>(dst, src),
        32.. => copy_pair::<32>(dst, src),
        16.. => copy_pair::<16>(dst, src),
        8.. => copy_pair::<8>(dst, src),
        4.. => copy_pair::<4>(dst, src),
        1.. => {
            dst[0] = src[0];
            dst[len / 2] = src[len / 2];
            dst[len - 1] = src[len - 1];
        }
        0 => {}
    }
}

/// Two `N`-byte windows: one at the start, one ending at the last byte
#[inline(always)]
fn copy_pair<const N: usize>(dst: &mut [u8], src: &[u8]) {
    let len = src.len();
    copy_window::<N>(dst, src, 0);
    copy_window::<N>(dst, src, len - N);
}

#[inline(always)]
fn copy_window<const N: usize>(dst: &mut [u8], src: &[u8], at: usize) {
    dst[at..at + N].copy_from_slice(&src[at..at + N]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + 3) as u8).collect()
    }

    #[test]
    fn test_every_size_class_is_byte_exact() {
        // Every tail class, block multiples, and the bulk boundary
        for len in (0..=300).chain([1024, 1500, 4096, 65_535, 65_536, 65_537, 100_000]) {
            let src = pattern(len);
            let mut dst = vec![0xEE; len + 16];

            let copied = copy(&mut dst[..len], &src);

            assert_eq!(copied, len);
            assert_eq!(&dst[..len], &src[..], "mismatch at len {}", len);
            // Nothing past the requested range is touched
            assert!(dst[len..].iter().all(|&b| b == 0xEE), "overrun at len {}", len);
        }
    }

    #[test]
    fn test_mismatched_lengths_copy_minimum() {
        let src = pattern(50);
        let mut dst = vec![0u8; 20];
        assert_eq!(copy(&mut dst, &src), 20);
        assert_eq!(&dst[..], &src[..20]);

        let mut dst = vec![0u8; 80];
        assert_eq!(copy(&mut dst, &src), 50);
        assert_eq!(&dst[..50], &src[..]);
        assert!(dst[50..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_unaligned_offsets() {
        let src = pattern(600);
        for offset in 0..8 {
            let mut dst = vec![0u8; 600];
            let n = copy(&mut dst[offset..], &src[offset..]);
            assert_eq!(n, 600 - offset);
            assert_eq!(&dst[offset..], &src[offset..]);
        }
    }
}
