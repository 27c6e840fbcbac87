use std::ops::Range;

use nalgebra::DMatrix;

use crate::error::{DesignError, DesignResult};

/// Partition of a combined design's columns into contiguous blocks, one per
/// class of homogeneous agents. Fixed once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLayout {
    sizes: Vec<usize>,
    starts: Vec<usize>,
    owner: Vec<usize>,
}

impl BlockLayout {
    pub fn new(sizes: Vec<usize>) -> DesignResult<Self> {
        if sizes.is_empty() {
            return Err(DesignError::InvalidParameter(
                "at least one block is required".into(),
            ));
        }
        if let Some(pos) = sizes.iter().position(|&s| s == 0) {
            return Err(DesignError::InvalidParameter(format!(
                "block {} has size 0",
                pos
            )));
        }

        let mut starts = Vec::with_capacity(sizes.len());
        let mut owner = Vec::with_capacity(sizes.iter().sum());
        for (block, &size) in sizes.iter().enumerate() {
            starts.push(owner.len());
            owner.extend(std::iter::repeat(block).take(size));
        }
        Ok(Self {
            sizes,
            starts,
            owner,
        })
    }

    /// A layout that must cover exactly `ncols` columns.
    pub fn for_columns(sizes: Vec<usize>, ncols: usize) -> DesignResult<Self> {
        let layout = Self::new(sizes)?;
        if layout.ncols() != ncols {
            return Err(DesignError::InvalidParameter(format!(
                "block sizes {:?} sum to {}, but the design has {} columns",
                layout.sizes,
                layout.ncols(),
                ncols
            )));
        }
        Ok(layout)
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub fn nblocks(&self) -> usize {
        self.sizes.len()
    }

    pub fn ncols(&self) -> usize {
        self.owner.len()
    }

    pub fn range(&self, block: usize) -> Range<usize> {
        self.starts[block]..self.starts[block] + self.sizes[block]
    }

    pub fn same_block(&self, a: usize, b: usize) -> bool {
        self.owner[a] == self.owner[b]
    }
}

/// Places per-class designs side by side and returns the combined matrix
/// with its layout. Every part needs the same number of runs.
pub fn combine_designs(parts: &[DMatrix<f64>]) -> DesignResult<(DMatrix<f64>, BlockLayout)> {
    let first = parts.first().ok_or_else(|| {
        DesignError::InvalidParameter("at least one design is required".into())
    })?;
    let nrows = first.nrows();
    if let Some(bad) = parts.iter().position(|p| p.nrows() != nrows) {
        return Err(DesignError::InvalidParameter(format!(
            "design {} has {} runs, expected {}",
            bad,
            parts[bad].nrows(),
            nrows
        )));
    }

    let layout = BlockLayout::new(parts.iter().map(|p| p.ncols()).collect())?;
    let mut combined = DMatrix::zeros(nrows, layout.ncols());
    for (block, part) in parts.iter().enumerate() {
        let range = layout.range(block);
        combined.columns_mut(range.start, range.len()).copy_from(part);
    }
    Ok((combined, layout))
}
