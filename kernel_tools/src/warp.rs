use crate::step::mult_step;

/// The number of lanes in a warp.
pub const WARP_SIZE: usize = 32;

/// Scratch memory shared by the lanes of one warp.
///
/// Lane `i` of the warp owns slot `i`. A warp that is only partially populated
/// (the short final chunk of an interval) simply holds fewer than
/// [`WARP_SIZE`] slots; since lanes only ever read from lower lanes, the
/// missing upper lanes never influence the valid ones.
///
/// The scan rounds write into a back buffer and swap it with the front buffer
/// once the round is complete, so every lane observes the value its neighbour
/// held before the round started.
#[derive(Debug, Clone)]
pub struct WarpScratch<T> {
    front: Vec<T>,
    back: Vec<T>,
}

impl<T> Default for WarpScratch<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WarpScratch<T> {
    pub fn new() -> Self {
        Self {
            front: Vec::with_capacity(WARP_SIZE),
            back: Vec::with_capacity(WARP_SIZE),
        }
    }

    /// The number of populated lanes.
    pub fn active_lanes(&self) -> usize {
        self.front.len()
    }

    pub fn lanes(&self) -> &[T] {
        &self.front
    }

    pub fn set_lane(&mut self, lane: usize, value: T) {
        self.front[lane] = value;
    }

    /// Populates the lanes from an iterator of at most [`WARP_SIZE`] values.
    pub fn load_with<I>(&mut self, values: I)
    where
        I: IntoIterator<Item = T>,
    {
        self.front.clear();
        self.front.extend(values.into_iter().take(WARP_SIZE));
    }

    /// Performs an in-place inclusive scan across the populated lanes.
    ///
    /// In round `k` lane `L` combines the value held by lane `L - 2^k` with
    /// its own value, left operand first, for every `L >= 2^k`. Rounds whose
    /// stride reaches past the last populated lane cannot change anything and
    /// are skipped.
    ///
    /// This uses the Kogge-Stone algorithm.
    pub fn scan<F>(&mut self, op: &F)
    where
        T: Clone,
        F: Fn(&T, &T) -> T,
    {
        let active = self.front.len();
        for stride in mult_step(1, 2).take_while(|&s| s < active.min(WARP_SIZE)) {
            self.back.clear();
            for lane in 0..active {
                let value = if lane >= stride {
                    op(&self.front[lane - stride], &self.front[lane])
                } else {
                    self.front[lane].clone()
                };
                self.back.push(value);
            }
            std::mem::swap(&mut self.front, &mut self.back);
        }
    }
}

impl<T: Clone> WarpScratch<T> {
    /// Copies the given lane values into scratch.
    pub fn load(&mut self, values: &[T]) {
        self.load_with(values.iter().cloned());
    }
}
