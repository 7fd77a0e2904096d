#[cfg(all(feature = "simd_keys", target_arch = "x86_64", target_feature = "sse2"))]
#[inline]
fn x86_64_sse_first_mismatch(a: &[u8], b: &[u8], len: usize) -> usize {
    use std::arch::x86_64::{__m128i, _mm_cmpeq_epi8, _mm_loadu_si128, _mm_movemask_epi8};

    let mut offset = 0;
    while offset + 16 <= len {
        let bitfield = unsafe {
            let lhs = _mm_loadu_si128(a.as_ptr().add(offset) as *const __m128i);
            let rhs = _mm_loadu_si128(b.as_ptr().add(offset) as *const __m128i);
            // One bit per equal byte; all sixteen set means the chunk matches.
            _mm_movemask_epi8(_mm_cmpeq_epi8(lhs, rhs)) as u32
        };
        if bitfield != 0xffff {
            return offset + (!bitfield).trailing_zeros() as usize;
        }
        offset += 16;
    }
    offset + scalar_first_mismatch(&a[offset..len], &b[offset..len])
}

#[inline]
fn scalar_first_mismatch(a: &[u8], b: &[u8]) -> usize {
    a.iter()
        .zip(b)
        .position(|(x, y)| x != y)
        .unwrap_or_else(|| a.len().min(b.len()))
}

/// Index of the first byte at which `a` and `b` differ, or the length of the shorter slice if
/// one is a prefix of the other.
#[inline]
pub fn first_mismatch(a: &[u8], b: &[u8]) -> usize {
    let len = a.len().min(b.len());

    #[cfg(all(feature = "simd_keys", target_arch = "x86_64", target_feature = "sse2"))]
    {
        x86_64_sse_first_mismatch(a, b, len)
    }

    #[cfg(not(all(feature = "simd_keys", target_arch = "x86_64", target_feature = "sse2")))]
    {
        scalar_first_mismatch(&a[..len], &b[..len])
    }
}
