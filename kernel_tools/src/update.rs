use crate::warp::{WarpScratch, WARP_SIZE};

/// Which scan the update pass finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Every element becomes `op(carry, element)`.
    Inclusive,
    /// Every element becomes `op(carry, element)` shifted down by one
    /// position, with the carry itself landing in the first position.
    Exclusive,
}

/// Applies a warp's carry-in to its interval, which must already hold the
/// locally complete inclusive scan.
///
/// Both modes walk the interval in warp-width chunks. In exclusive mode lane 0
/// of each chunk receives the rolling `first` register and lane `k > 0`
/// receives the combined value of lane `k - 1`; the last lane of the chunk
/// then refills `first` for the next chunk.
pub fn update_interval<T, F>(
    dst: &mut [T],
    carry: &T,
    mode: UpdateMode,
    scratch: &mut WarpScratch<T>,
    op: &F,
) where
    T: Clone,
    F: Fn(&T, &T) -> T,
{
    let mut first = carry.clone();

    for chunk in dst.chunks_mut(WARP_SIZE) {
        scratch.load_with(chunk.iter().map(|value| op(carry, value)));
        let combined = scratch.lanes();

        match mode {
            UpdateMode::Inclusive => chunk.clone_from_slice(combined),
            UpdateMode::Exclusive => {
                let last = chunk.len() - 1;
                chunk[1..].clone_from_slice(&combined[..last]);
                chunk[0] = std::mem::replace(&mut first, combined[last].clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{update_interval, UpdateMode};
    use crate::warp::WarpScratch;
    use itertools::Itertools;

    fn sum(a: &u32, b: &u32) -> u32 {
        a + b
    }

    #[test]
    fn inclusive_adds_carry() {
        let mut dst = vec![1u32, 3, 6];
        update_interval(&mut dst, &10, UpdateMode::Inclusive, &mut WarpScratch::new(), &sum);
        assert_eq!(dst, vec![11, 13, 16]);
    }

    #[test]
    fn exclusive_shifts_within_chunk() {
        // Local inclusive scan of [1, 2, 3, 4].
        let mut dst = vec![1u32, 3, 6, 10];
        update_interval(&mut dst, &100, UpdateMode::Exclusive, &mut WarpScratch::new(), &sum);
        assert_eq!(dst, vec![100, 101, 103, 106]);
    }

    #[test]
    fn exclusive_shifts_across_chunks() {
        let len = 70u32;
        let local = (1..=len).collect_vec();
        let mut dst = local.clone();
        update_interval(&mut dst, &5, UpdateMode::Exclusive, &mut WarpScratch::new(), &sum);

        let mut expected = vec![5];
        expected.extend(local[..local.len() - 1].iter().map(|v| v + 5));
        assert_eq!(dst, expected);
    }

    #[test]
    fn carry_is_left_operand() {
        let mut dst = vec!["b".to_string(), "bc".to_string()];
        update_interval(
            &mut dst,
            &"a".to_string(),
            UpdateMode::Inclusive,
            &mut WarpScratch::new(),
            &|a: &String, b: &String| format!("{a}{b}"),
        );
        assert_eq!(dst, vec!["ab", "abc"]);
    }

    #[test]
    fn empty_interval_is_untouched() {
        let mut dst: Vec<u32> = vec![];
        update_interval(&mut dst, &1, UpdateMode::Exclusive, &mut WarpScratch::new(), &sum);
        assert!(dst.is_empty());
    }
}
