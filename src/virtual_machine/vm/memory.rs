use crate::virtual_machine::errors::VMError;
use std::collections::HashMap;

/// Smallest size the dense region may grow to on a write past its end.
const MIN_DENSE_GROWTH: usize = 1024;

/// Dense region never grows past this many cells; higher addresses are sparse.
const DENSE_LIMIT: usize = 1 << 20;

/// Flat integer address space of one machine.
///
/// Memory layout: `[dense region][sparse region]`
/// - **Dense region**: A vector holding the program image and any cells
///   written close past its end. Grows by at most doubling.
/// - **Sparse region**: A map for cells written far past the dense region,
///   such as a relative base pushed to a huge offset.
///
/// A cell lives in exactly one region. Cells never written read as zero.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Memory {
    dense: Vec<i64>,
    sparse: HashMap<usize, i64>,
    /// Lowest sparse address, if any.
    sparse_min: Option<usize>,
}

impl Memory {
    /// Creates memory holding `image` at addresses `0..image.len()`.
    pub fn new(image: &[i64]) -> Self {
        Self {
            dense: image.to_vec(),
            sparse: HashMap::new(),
            sparse_min: None,
        }
    }

    /// Returns the value at `address`, or 0 if it was never written.
    pub fn read(&self, address: i64) -> Result<i64, VMError> {
        let index = Self::index(address)?;
        Ok(match self.dense.get(index) {
            Some(value) => *value,
            None => self.sparse.get(&index).copied().unwrap_or(0),
        })
    }

    /// Stores `value` at `address`, extending the address space as needed.
    pub fn write(&mut self, address: i64, value: i64) -> Result<(), VMError> {
        let index = Self::index(address)?;
        if index < self.dense.len() {
            self.dense[index] = value;
        } else if index < self.growth_bound() {
            self.grow(index + 1);
            self.dense[index] = value;
        } else {
            self.sparse.insert(index, value);
            self.sparse_min = Some(self.sparse_min.map_or(index, |min| min.min(index)));
        }
        Ok(())
    }

    /// Fails with `InvalidAddress` if `address` can never be read or written.
    pub fn check_address(address: i64) -> Result<(), VMError> {
        Self::index(address).map(|_| ())
    }

    /// Returns the dense region: the program image plus any cells grown into.
    pub fn as_slice(&self) -> &[i64] {
        &self.dense
    }

    /// Copies the dense region.
    pub fn snapshot(&self) -> Vec<i64> {
        self.dense.clone()
    }

    /// Length of the dense region.
    pub fn len(&self) -> usize {
        self.dense.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dense.is_empty() && self.sparse.is_empty()
    }

    /// Cells stored outside the dense region, sorted by address.
    pub fn sparse_cells(&self) -> Vec<(usize, i64)> {
        let mut cells: Vec<_> = self.sparse.iter().map(|(k, v)| (*k, *v)).collect();
        cells.sort_unstable();
        cells
    }

    fn index(address: i64) -> Result<usize, VMError> {
        usize::try_from(address).map_err(|_| VMError::InvalidAddress { address })
    }

    fn growth_bound(&self) -> usize {
        (self.dense.len() * 2).max(MIN_DENSE_GROWTH).min(DENSE_LIMIT)
    }

    /// Grows the dense region to `new_len` cells and pulls in any sparse cells it now covers.
    fn grow(&mut self, new_len: usize) {
        self.dense.resize(new_len, 0);
        if self.sparse_min.is_none_or(|min| min >= new_len) {
            return;
        }
        let dense = &mut self.dense;
        self.sparse.retain(|&index, value| {
            if index < new_len {
                dense[index] = *value;
                false
            } else {
                true
            }
        });
        self.sparse_min = self.sparse.keys().min().copied();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritten_cells_read_zero() {
        let memory = Memory::new(&[1, 2, 3]);
        assert_eq!(memory.read(1).unwrap(), 2);
        assert_eq!(memory.read(3).unwrap(), 0);
        assert_eq!(memory.read(1_000_000_000).unwrap(), 0);
    }

    #[test]
    fn negative_addresses_fail() {
        let mut memory = Memory::new(&[0]);
        assert_eq!(
            memory.read(-1),
            Err(VMError::InvalidAddress { address: -1 })
        );
        assert_eq!(
            memory.write(-5, 1),
            Err(VMError::InvalidAddress { address: -5 })
        );
    }

    #[test]
    fn nearby_writes_grow_dense_region() {
        let mut memory = Memory::new(&[1, 2]);
        memory.write(10, 7).unwrap();
        assert_eq!(memory.len(), 11);
        assert_eq!(memory.as_slice()[10], 7);
        assert_eq!(memory.as_slice()[5], 0);
        assert!(memory.sparse_cells().is_empty());
    }

    #[test]
    fn far_writes_stay_sparse() {
        let mut memory = Memory::new(&[1, 2]);
        memory.write(5_000_000, 9).unwrap();
        assert_eq!(memory.len(), 2);
        assert_eq!(memory.read(5_000_000).unwrap(), 9);
        assert_eq!(memory.sparse_cells(), vec![(5_000_000, 9)]);
    }

    #[test]
    fn growth_absorbs_sparse_cells() {
        let mut memory = Memory::new(&[]);
        memory.write(3000, 4).unwrap();
        assert_eq!(memory.sparse_cells(), vec![(3000, 4)]);

        // Walk the dense region up until it covers 3000.
        let mut address = 0;
        while memory.len() <= 3000 {
            memory.write(address, 1).unwrap();
            address = (memory.len() * 2 - 1) as i64;
        }

        assert!(memory.sparse_cells().is_empty());
        assert_eq!(memory.read(3000).unwrap(), 4);
    }

    #[test]
    fn growth_absorbs_only_covered_sparse_cells() {
        let mut memory = Memory::new(&[0; 1000]);
        memory.write(5000, 2).unwrap();
        memory.write(2100, 1).unwrap();

        // Dense grows to 2000: nothing sparse is covered yet.
        memory.write(1999, 9).unwrap();
        assert_eq!(memory.len(), 2000);
        assert_eq!(memory.sparse_cells(), vec![(2100, 1), (5000, 2)]);

        // Dense grows to 4000: 2100 moves, 5000 stays.
        memory.write(3999, 9).unwrap();
        assert_eq!(memory.sparse_cells(), vec![(5000, 2)]);
        assert_eq!(memory.as_slice()[2100], 1);

        memory.write(7999, 9).unwrap();
        assert!(memory.sparse_cells().is_empty());
        assert_eq!(memory.read(5000).unwrap(), 2);
        assert_eq!(memory.read(2100).unwrap(), 1);
    }

    #[test]
    fn check_address_rejects_negative() {
        assert_eq!(Memory::check_address(0), Ok(()));
        assert_eq!(
            Memory::check_address(-1),
            Err(VMError::InvalidAddress { address: -1 })
        );
    }
}
