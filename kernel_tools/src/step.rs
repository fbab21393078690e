pub struct MultStep {
    factor: usize,
    next: usize,
}

impl Iterator for MultStep {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.next;
        self.next *= self.factor;
        Some(next)
    }
}

// Returns an iterator that generates numbers by multiplying by the given
// factor.
pub fn mult_step(init: usize, factor: usize) -> MultStep {
    MultStep { factor, next: init }
}

#[cfg(test)]
mod tests {
    use super::mult_step;
    use itertools::Itertools;

    #[test]
    fn warp_strides() {
        let strides = mult_step(1, 2).take_while(|&s| s < 32).collect_vec();
        assert_eq!(strides, vec![1, 2, 4, 8, 16]);
    }
}
