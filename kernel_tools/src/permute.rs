//! Index-driven copies. Every output position is independent, so a block only
//! ever touches its own slice of the output.

/// Writes `input[map[i]]` to `output[i]` for every position of the block.
///
/// # Panics
///
/// Panics if a map entry is out of range for `input`.
pub fn gather_block<T: Clone>(output: &mut [T], map: &[usize], input: &[T]) {
    for (out, &index) in output.iter_mut().zip(map) {
        *out = input[index].clone();
    }
}

/// Like [`gather_block`], but positions whose stencil value fails `pred` are
/// left untouched.
///
/// # Panics
///
/// Panics if a selected map entry is out of range for `input`.
pub fn gather_if_block<T, S, P>(
    output: &mut [T],
    map: &[usize],
    stencil: &[S],
    input: &[T],
    pred: &P,
) where
    T: Clone,
    P: Fn(&S) -> bool,
{
    for ((out, &index), s) in output.iter_mut().zip(map).zip(stencil) {
        if pred(s) {
            *out = input[index].clone();
        }
    }
}

/// Exchanges the elements of `a` with the leading elements of `b`.
pub fn swap_block<T>(a: &mut [T], b: &mut [T]) {
    for (x, y) in a.iter_mut().zip(b.iter_mut()) {
        std::mem::swap(x, y);
    }
}
