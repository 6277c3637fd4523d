//! Numeric utilities: safe and centralized integer conversions.
//!
//! Guidelines
//! - Prefer fallible conversions (returning Option<T>) when a value out of range should stop the operation (e.g., parsing a length before slicing).
//! - Prefer lossless widening with explicit helpers to keep call sites consistent and searchable.

#[inline]
#[must_use]
pub fn u64_to_usize(v: u64) -> Option<usize> {
    usize::try_from(v).ok()
}

#[inline]
#[must_use]
pub fn u32_to_usize(v: u32) -> usize {
    usize::try_from(v).unwrap_or(usize::MAX)
}

#[inline]
#[must_use]
pub fn i64_to_usize(v: i64) -> Option<usize> {
    usize::try_from(v).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u64_to_usize_matches_std_try_from() {
        for &v in &[0u64, 1, 42, u32::MAX as u64, u64::from(u32::MAX) + 1] {
            assert_eq!(u64_to_usize(v), usize::try_from(v).ok());
        }
    }

    #[test]
    fn u32_to_usize_behaves() {
        let big: u32 = u32::MAX;
        let conv = u32_to_usize(big);
        if std::mem::size_of::<usize>() >= 4 {
            assert_eq!(conv, usize::try_from(big).unwrap_or(usize::MAX));
        } else {
            assert_eq!(conv, usize::MAX);
        }
    }

    #[test]
    fn i64_to_usize_rejects_negative() {
        assert_eq!(i64_to_usize(-1), None);
        assert_eq!(i64_to_usize(42), Some(42));
    }
}
