use crate::warp::{WarpScratch, WARP_SIZE};

/// The slice of the input and output owned by a single warp.
///
/// When `src` is absent the warp reads its input from `dst`, which is how
/// in-place scans and the carry array scans are run.
#[derive(Debug)]
pub struct IntervalIo<'a, T> {
    src: Option<&'a [T]>,
    dst: &'a mut [T],
}

impl<'a, T> IntervalIo<'a, T> {
    /// `src` and `dst` must cover the same interval.
    pub fn split(src: &'a [T], dst: &'a mut [T]) -> Self {
        debug_assert_eq!(src.len(), dst.len());
        Self { src: Some(src), dst }
    }

    pub fn in_place(dst: &'a mut [T]) -> Self {
        Self { src: None, dst }
    }

    pub fn len(&self) -> usize {
        self.dst.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dst.is_empty()
    }

    fn input(&self, start: usize, end: usize) -> &[T] {
        match self.src {
            Some(src) => &src[start..end],
            None => &self.dst[start..end],
        }
    }
}

/// Performs an inclusive scan over a single interval.
///
/// For intervals of length 2:
///    [ a, b, c, d, ... ] -> [ a, a+b, c, c+d, ... ]
///
/// The interval is walked in warp-width chunks. The first chunk is scanned as
/// is; each later chunk first folds the running carry into its lane 0 so the
/// carry propagates in element order. The last valid lane of every chunk,
/// `min(len - start - 1, WARP_SIZE - 1)`, becomes the carry for the next one.
///
/// Returns the total of the interval, or `None` when the warp owns no elements
/// and therefore must not publish a carry.
pub fn scan_interval<T, F>(
    mut io: IntervalIo<'_, T>,
    scratch: &mut WarpScratch<T>,
    op: &F,
) -> Option<T>
where
    T: Clone,
    F: Fn(&T, &T) -> T,
{
    let len = io.len();
    let mut carry: Option<T> = None;

    let mut start = 0;
    while start < len {
        let end = (start + WARP_SIZE).min(len);
        scratch.load(io.input(start, end));

        if let Some(carry) = &carry {
            let seeded = op(carry, &scratch.lanes()[0]);
            scratch.set_lane(0, seeded);
        }

        scratch.scan(op);

        let last_lane = (len - start - 1).min(WARP_SIZE - 1);
        carry = Some(scratch.lanes()[last_lane].clone());

        io.dst[start..end].clone_from_slice(scratch.lanes());
        start += WARP_SIZE;
    }

    carry
}
