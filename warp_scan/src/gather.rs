use crate::{
    device::{default_device, Device},
    error::{Result, ScanError},
    launch::divide_into,
};
use kernel_tools::permute::{gather_block, gather_if_block, swap_block};
use rayon::prelude::*;

/// Gather on the default device.
pub fn gather<T>(output: &mut [T], map: &[usize], input: &[T]) -> Result<()>
where
    T: Clone + Send + Sync,
{
    default_device()?.gather(output, map, input)
}

/// Gather-if on the default device.
pub fn gather_if<T, S, P>(
    output: &mut [T],
    map: &[usize],
    stencil: &[S],
    input: &[T],
    pred: P,
) -> Result<()>
where
    T: Clone + Send + Sync,
    S: Sync,
    P: Fn(&S) -> bool + Sync,
{
    default_device()?.gather_if(output, map, stencil, input, pred)
}

/// Swap ranges on the default device.
pub fn swap_ranges<T: Send>(a: &mut [T], b: &mut [T]) -> Result<usize> {
    default_device()?.swap_ranges(a, b)
}

fn check_len(name: &'static str, expected: usize, actual: usize) -> Result<()> {
    if actual < expected {
        return Err(ScanError::LengthMismatch {
            name,
            expected,
            actual,
        });
    }
    Ok(())
}

impl Device {
    /// Writes `input[map[i]]` to `output[i]` for every position of `output`.
    ///
    /// # Panics
    ///
    /// Panics if a map entry is out of range for `input`.
    pub fn gather<T>(&self, output: &mut [T], map: &[usize], input: &[T]) -> Result<()>
    where
        T: Clone + Send + Sync,
    {
        check_len("map", output.len(), map.len())?;
        if output.is_empty() {
            return Ok(());
        }

        let block_size = self.config().block_size;
        let num_blocks = divide_into(output.len(), block_size);
        self.launch("gather", num_blocks, block_size, || {
            output
                .par_chunks_mut(block_size)
                .zip(map.par_chunks(block_size))
                .for_each(|(output, map)| gather_block(output, map, input))
        });
        Ok(())
    }

    /// Like [`Device::gather`], but positions where `pred(stencil[i])` is false
    /// keep their current value.
    ///
    /// # Panics
    ///
    /// Panics if a selected map entry is out of range for `input`.
    pub fn gather_if<T, S, P>(
        &self,
        output: &mut [T],
        map: &[usize],
        stencil: &[S],
        input: &[T],
        pred: P,
    ) -> Result<()>
    where
        T: Clone + Send + Sync,
        S: Sync,
        P: Fn(&S) -> bool + Sync,
    {
        check_len("map", output.len(), map.len())?;
        check_len("stencil", output.len(), stencil.len())?;
        if output.is_empty() {
            return Ok(());
        }

        let block_size = self.config().block_size;
        let num_blocks = divide_into(output.len(), block_size);
        self.launch("gather_if", num_blocks, block_size, || {
            output
                .par_chunks_mut(block_size)
                .zip(map.par_chunks(block_size))
                .zip(stencil.par_chunks(block_size))
                .for_each(|((output, map), stencil)| {
                    gather_if_block(output, map, stencil, input, &pred)
                })
        });
        Ok(())
    }

    /// Exchanges every element of `a` with the element at the same position in
    /// `b` and returns the number of swapped elements.
    pub fn swap_ranges<T: Send>(&self, a: &mut [T], b: &mut [T]) -> Result<usize> {
        check_len("b", a.len(), b.len())?;
        let len = a.len();
        if len == 0 {
            return Ok(0);
        }

        let block_size = self.config().block_size;
        let num_blocks = divide_into(len, block_size);
        let b = &mut b[..len];
        self.launch("swap_ranges", num_blocks, block_size, || {
            a.par_chunks_mut(block_size)
                .zip(b.par_chunks_mut(block_size))
                .for_each(|(a, b)| swap_block(a, b))
        });
        Ok(len)
    }
}
