//! Double-buffered fields.
//!
//! A [`BufferPair`] owns two same-sized fields. At any instant one is the
//! *read* half and the other the *write* half; stages read the former and
//! write the latter, then [`BufferPair::swap`] flips the roles by toggling an
//! index. No texel data is ever copied by a swap.

use crate::error::{FluidError, Result};
use crate::field::{Field, GridSize, Texel};

#[derive(Debug, Clone)]
pub struct BufferPair<T> {
    fields: [Field<T>; 2],
    read: usize,
}

impl<T: Texel> BufferPair<T> {
    /// Allocates two zero-filled fields.
    pub fn allocate(size: GridSize, resource: &'static str) -> Result<Self> {
        let alloc = || {
            Field::zeroed(size)
                .map_err(|e| FluidError::allocation(resource, size.width, size.height, e))
        };
        Ok(Self {
            fields: [alloc()?, alloc()?],
            read: 0,
        })
    }
}

impl<T> BufferPair<T> {
    pub fn size(&self) -> GridSize {
        self.fields[0].size()
    }

    #[inline]
    pub fn read(&self) -> &Field<T> {
        &self.fields[self.read]
    }

    #[inline]
    pub fn write(&self) -> &Field<T> {
        &self.fields[1 - self.read]
    }

    #[inline]
    pub fn read_mut(&mut self) -> &mut Field<T> {
        &mut self.fields[self.read]
    }

    #[inline]
    pub fn write_mut(&mut self) -> &mut Field<T> {
        &mut self.fields[1 - self.read]
    }

    /// Borrow the read half immutably and the write half mutably at once.
    pub fn split(&mut self) -> (&Field<T>, &mut Field<T>) {
        let [a, b] = &mut self.fields;
        if self.read == 0 { (a, b) } else { (b, a) }
    }

    /// Both halves mutably, for stages that use the pair as scratch.
    pub fn halves_mut(&mut self) -> (&mut Field<T>, &mut Field<T>) {
        let [a, b] = &mut self.fields;
        if self.read == 0 { (a, b) } else { (b, a) }
    }

    /// Exchange read/write roles in O(1).
    #[inline]
    pub fn swap(&mut self) {
        self.read = 1 - self.read;
    }

    /// Moves `other`'s read half into this pair as the new read half, handing
    /// this pair's write half to `other` in exchange. Both moves are handle
    /// swaps.
    pub fn adopt_read(&mut self, other: &mut BufferPair<T>) {
        std::mem::swap(self.write_mut(), other.read_mut());
        self.swap();
    }

    /// Frees both halves.
    pub fn release(&mut self) {
        for field in &mut self.fields {
            field.release();
        }
        self.read = 0;
    }
}
