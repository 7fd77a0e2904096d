use std::fmt::{Debug, Formatter};

use num_traits::PrimInt;

pub trait BitsetTrait: Default + Copy {
    fn set(&mut self, pos: usize);
    fn unset(&mut self, pos: usize);
    fn check(&self, pos: usize) -> bool;
    /// Number of set positions strictly below `pos`.
    fn rank(&self, pos: usize) -> usize;
    fn is_empty(&self) -> bool;
    fn size(&self) -> usize;
}

/// Single-word bitset exposing `BIT_WIDTH` positions of its storage integer.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Bitset<StorageType, const BIT_WIDTH: usize>
where
    StorageType: PrimInt,
{
    bits: StorageType,
}

impl<StorageType, const BIT_WIDTH: usize> Bitset<StorageType, BIT_WIDTH>
where
    StorageType: PrimInt,
{
    const STORAGE_BITS: usize = std::mem::size_of::<StorageType>() * 8;

    pub fn new() -> Self {
        assert!(BIT_WIDTH <= Self::STORAGE_BITS);
        Self {
            bits: StorageType::zero(),
        }
    }

    #[inline]
    fn mask_below(pos: usize) -> StorageType {
        if pos >= Self::STORAGE_BITS {
            StorageType::max_value()
        } else {
            (StorageType::one() << pos) - StorageType::one()
        }
    }

    #[inline]
    pub fn bits(&self) -> StorageType {
        self.bits
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> {
        let mut remaining = self.bits;
        std::iter::from_fn(move || {
            if remaining.is_zero() {
                return None;
            }
            let pos = remaining.trailing_zeros() as usize;
            remaining = remaining & (remaining - StorageType::one());
            Some(pos)
        })
    }
}

impl<StorageType, const BIT_WIDTH: usize> BitsetTrait for Bitset<StorageType, BIT_WIDTH>
where
    StorageType: PrimInt,
{
    #[inline]
    fn set(&mut self, pos: usize) {
        assert!(pos < BIT_WIDTH);
        self.bits = self.bits | (StorageType::one() << pos);
    }

    #[inline]
    fn unset(&mut self, pos: usize) {
        assert!(pos < BIT_WIDTH);
        self.bits = self.bits & !(StorageType::one() << pos);
    }

    #[inline]
    fn check(&self, pos: usize) -> bool {
        assert!(pos < BIT_WIDTH);
        !(self.bits & (StorageType::one() << pos)).is_zero()
    }

    #[inline]
    fn rank(&self, pos: usize) -> usize {
        (self.bits & Self::mask_below(pos)).count_ones() as usize
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.bits.is_zero()
    }

    #[inline]
    fn size(&self) -> usize {
        self.bits.count_ones() as usize
    }
}

impl<StorageType, const BIT_WIDTH: usize> Default for Bitset<StorageType, BIT_WIDTH>
where
    StorageType: PrimInt,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<StorageType, const BIT_WIDTH: usize> Debug for Bitset<StorageType, BIT_WIDTH>
where
    StorageType: PrimInt,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

pub type Bitset32<const BIT_WIDTH: usize> = Bitset<u32, BIT_WIDTH>;

#[cfg(test)]
mod tests {
    use crate::utils::bitset::BitsetTrait;

    #[test]
    fn test_rank_17s() {
        let mut bs = super::Bitset32::<17>::new();
        bs.set(0);
        bs.set(3);
        bs.set(9);
        bs.set(16);
        assert_eq!(bs.rank(0), 0);
        assert_eq!(bs.rank(1), 1);
        assert_eq!(bs.rank(3), 1);
        assert_eq!(bs.rank(4), 2);
        assert_eq!(bs.rank(16), 3);
        assert_eq!(bs.rank(17), 4);
        assert_eq!(bs.size(), 4);
    }

    #[test]
    fn test_set_unset_8s() {
        let mut bs = super::Bitset::<u8, 8>::new();
        assert!(bs.is_empty());
        bs.set(2);
        bs.set(7);
        assert_eq!(bs.bits(), 0b1000_0100);
        assert_eq!(bs.rank(7), 1);
        bs.unset(2);
        assert_eq!(bs.rank(7), 0);
        assert_eq!(bs.size(), 1);
        bs.unset(7);
        assert!(bs.is_empty());
    }

    #[test]
    fn test_iter_17s() {
        let mut bs = super::Bitset32::<17>::new();
        bs.set(0);
        bs.set(1);
        bs.set(2);
        bs.set(4);
        bs.set(8);
        bs.set(16);
        let v: Vec<usize> = bs.iter().collect();
        assert_eq!(v, vec![0, 1, 2, 4, 8, 16]);
        assert!(bs.check(8));
        assert!(!bs.check(9));
    }

    #[test]
    #[should_panic]
    fn test_out_of_range() {
        let mut bs = super::Bitset32::<17>::new();
        bs.set(17);
    }
}
