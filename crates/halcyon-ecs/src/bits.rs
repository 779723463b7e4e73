use bit_vec::BitVec;

/// A growable bit-vector keyed by small dense indices (component-type and
/// family indices). Reads past the end are `false`, writes grow the vector.
///
/// Set-algebra tests work block-wise, so `Family::matches` stays
/// proportional to the number of machine words, not the number of bits.
#[derive(Debug, Clone, Default)]
pub struct Bits {
    inner: BitVec,
}

impl Bits {
    pub fn new() -> Self {
        Self {
            inner: BitVec::new(),
        }
    }

    /// Set the bit at `index`, growing the vector if needed.
    pub fn set(&mut self, index: usize) {
        if index >= self.inner.len() {
            self.inner.grow(index + 1 - self.inner.len(), false);
        }
        self.inner.set(index, true);
    }

    /// Clear the bit at `index`. Out-of-range indices are a no-op.
    pub fn clear(&mut self, index: usize) {
        if index < self.inner.len() {
            self.inner.set(index, false);
        }
    }

    /// Read the bit at `index`. Out-of-range reads are `false`.
    pub fn get(&self, index: usize) -> bool {
        self.inner.get(index).unwrap_or(false)
    }

    /// `true` if no bit is set.
    pub fn is_empty(&self) -> bool {
        self.inner.none()
    }

    /// `true` if every bit set in `other` is also set in `self`.
    pub fn contains_all(&self, other: &Bits) -> bool {
        let mut ours = self.inner.blocks();
        for theirs in other.inner.blocks() {
            let block = ours.next().unwrap_or(0);
            if theirs & !block != 0 {
                return false;
            }
        }
        true
    }

    /// `true` if at least one bit is set in both `self` and `other`.
    pub fn intersects(&self, other: &Bits) -> bool {
        self.inner
            .blocks()
            .zip(other.inner.blocks())
            .any(|(a, b)| a & b != 0)
    }

    /// Iterate the indices of all set bits, ascending.
    pub fn iter_set(&self) -> impl Iterator<Item = usize> + '_ {
        self.inner
            .iter()
            .enumerate()
            .filter_map(|(index, bit)| bit.then_some(index))
    }
}

impl PartialEq for Bits {
    fn eq(&self, other: &Self) -> bool {
        // Lengths may differ; trailing zero blocks are insignificant.
        let mut ours = self.inner.blocks();
        let mut theirs = other.inner.blocks();
        loop {
            match (ours.next(), theirs.next()) {
                (None, None) => return true,
                (a, b) => {
                    if a.unwrap_or(0) != b.unwrap_or(0) {
                        return false;
                    }
                }
            }
        }
    }
}

impl Eq for Bits {}
