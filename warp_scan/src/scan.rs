use crate::{
    config::CarryStrategy,
    device::{copy_from_host, copy_to_host, default_device, Device, DeviceBuffer},
    error::{Result, ScanError},
    launch::LaunchPlan,
};
use kernel_tools::{
    scan_interval, update_interval, IntervalIo, UpdateMode, WarpScratch, WARP_SIZE,
};
use rayon::prelude::*;

/// Inclusive scan.
pub fn sequential_scan<T, F>(xs: &[T], ys: &mut [T], op: F)
where
    T: Clone,
    F: Fn(&T, &T) -> T,
{
    let max_i = xs.len().min(ys.len());
    if max_i == 0 {
        return;
    }

    let mut accumulator = xs[0].clone();
    ys[0] = accumulator.clone();

    for i in 1..max_i {
        accumulator = op(&accumulator, &xs[i]);
        ys[i] = accumulator.clone();
    }
}

/// Exclusive scan.
pub fn sequential_exclusive_scan<T, F>(xs: &[T], ys: &mut [T], init: T, op: F)
where
    T: Clone,
    F: Fn(&T, &T) -> T,
{
    let mut accumulator = init;

    for (x, y) in xs.iter().zip(ys.iter_mut()) {
        let next = op(&accumulator, x);
        *y = std::mem::replace(&mut accumulator, next);
    }
}

/// In-place inclusive sequential scan.
fn sequential_scan_in_place<T, F>(xs: &mut [T], op: &F)
where
    F: Fn(&T, &T) -> T,
{
    for i in 1..xs.len() {
        let next = op(&xs[i - 1], &xs[i]);
        xs[i] = next;
    }
}

/// Inclusive scan on the default device.
pub fn inclusive_scan<T, F>(src: &[T], dst: &mut [T], op: F) -> Result<()>
where
    T: Clone + Send + Sync,
    F: Fn(&T, &T) -> T + Sync,
{
    default_device()?.inclusive_scan(src, dst, op)
}

/// Exclusive scan on the default device.
pub fn exclusive_scan<T, F>(src: &[T], dst: &mut [T], init: T, op: F) -> Result<()>
where
    T: Clone + Send + Sync,
    F: Fn(&T, &T) -> T + Sync,
{
    default_device()?.exclusive_scan(src, dst, init, op)
}

impl Device {
    /// Writes `op(...op(op(src[0], src[1]), src[2])..., src[i])` to `dst[i]`.
    ///
    /// `op` must be associative; it is never assumed to be commutative, and
    /// every combination keeps the earlier element on the left. Only the first
    /// `src.len()` elements of `dst` are written.
    pub fn inclusive_scan<T, F>(&self, src: &[T], dst: &mut [T], op: F) -> Result<()>
    where
        T: Clone + Send + Sync,
        F: Fn(&T, &T) -> T + Sync,
    {
        let dst = destination(dst, src.len())?;
        self.run_scan(Some(src), dst, None, &op)
    }

    pub fn inclusive_scan_in_place<T, F>(&self, data: &mut [T], op: F) -> Result<()>
    where
        T: Clone + Send + Sync,
        F: Fn(&T, &T) -> T + Sync,
    {
        self.run_scan(None, data, None, &op)
    }

    /// Writes `init` to `dst[0]` and `op(dst[i - 1], src[i - 1])` to every
    /// later position.
    pub fn exclusive_scan<T, F>(&self, src: &[T], dst: &mut [T], init: T, op: F) -> Result<()>
    where
        T: Clone + Send + Sync,
        F: Fn(&T, &T) -> T + Sync,
    {
        let dst = destination(dst, src.len())?;
        self.run_scan(Some(src), dst, Some(init), &op)
    }

    pub fn exclusive_scan_in_place<T, F>(&self, data: &mut [T], init: T, op: F) -> Result<()>
    where
        T: Clone + Send + Sync,
        F: Fn(&T, &T) -> T + Sync,
    {
        self.run_scan(None, data, Some(init), &op)
    }

    /// Replaces `carries` with its inclusive scan.
    ///
    /// On the device, an array of at most `carry_span` elements is scanned by
    /// a single warp. Longer arrays are partitioned again, one level per pass,
    /// until a level fits; the levels are then unwound with the update kernel.
    /// `strategy` is consulted at every level, so the host can take over once
    /// a level is short enough.
    pub fn scan_carries<T, F>(
        &self,
        carries: &mut [T],
        strategy: CarryStrategy,
        op: F,
    ) -> Result<()>
    where
        T: Clone + Send + Sync,
        F: Fn(&T, &T) -> T + Sync,
    {
        self.aggregate_carries(carries, strategy, &op)
    }

    fn run_scan<T, F>(
        &self,
        src: Option<&[T]>,
        dst: &mut [T],
        init: Option<T>,
        op: &F,
    ) -> Result<()>
    where
        T: Clone + Send + Sync,
        F: Fn(&T, &T) -> T + Sync,
    {
        let n = dst.len();
        if n == 0 {
            return Ok(());
        }

        let plan = self.plan(n)?;
        let mode = match init {
            Some(_) => UpdateMode::Exclusive,
            None => UpdateMode::Inclusive,
        };
        log::debug!(
            "{:?} scan of {} elements: {} warps of {} elements in {} blocks",
            mode,
            n,
            plan.num_warps,
            plan.interval_size,
            plan.num_blocks
        );

        // Exclusive scans keep the initial value in slot 0, ahead of the
        // carry of warp 0.
        let mut carries = self.alloc::<T>(plan.num_warps + usize::from(init.is_some()))?;
        if let Some(init) = init {
            carries.push(init);
        }

        self.partition_phase(src, dst, &plan, &mut carries, op);
        self.aggregate_carries(carries.as_mut_slice(), self.config().carry_strategy, op)?;
        self.update_phase(dst, &plan, carries.as_slice(), mode, op);

        Ok(())
    }

    /// Scans every interval on its own and appends one carry per warp.
    fn partition_phase<T, F>(
        &self,
        src: Option<&[T]>,
        dst: &mut [T],
        plan: &LaunchPlan,
        carries: &mut DeviceBuffer<T>,
        op: &F,
    ) where
        T: Clone + Send + Sync,
        F: Fn(&T, &T) -> T + Sync,
    {
        let expected = carries.len() + plan.num_warps;
        let interval_size = plan.interval_size;
        let warps_per_block = plan.warps_per_block();

        self.launch("interval_scan", plan.num_blocks, plan.block_size, || match src {
            Some(src) => carries.par_extend(
                src.par_chunks(interval_size)
                    .zip(dst.par_chunks_mut(interval_size))
                    .with_min_len(warps_per_block)
                    .map_init(WarpScratch::new, |scratch, (src, dst)| {
                        scan_interval(IntervalIo::split(src, dst), scratch, op)
                    })
                    .flatten_iter(),
            ),
            None => carries.par_extend(
                dst.par_chunks_mut(interval_size)
                    .with_min_len(warps_per_block)
                    .map_init(WarpScratch::new, |scratch, dst| {
                        scan_interval(IntervalIo::in_place(dst), scratch, op)
                    })
                    .flatten_iter(),
            ),
        });

        debug_assert_eq!(carries.len(), expected);
    }

    fn aggregate_carries<T, F>(
        &self,
        carries: &mut [T],
        strategy: CarryStrategy,
        op: &F,
    ) -> Result<()>
    where
        T: Clone + Send + Sync,
        F: Fn(&T, &T) -> T + Sync,
    {
        let mut levels: Vec<(LaunchPlan, DeviceBuffer<T>)> = Vec::new();

        loop {
            let current = match levels.last_mut() {
                Some((_, upper)) => upper.as_mut_slice(),
                None => &mut *carries,
            };
            let len = current.len();
            if len <= 1 {
                break;
            }

            if strategy.on_host(len) {
                log::debug!("scanning {len} carries on the host");
                scan_on_host(current, op)?;
                break;
            }

            if len <= self.config().carry_span {
                self.launch("carry_scan", 1, WARP_SIZE, || {
                    scan_interval(IntervalIo::in_place(current), &mut WarpScratch::new(), op);
                });
                break;
            }

            let plan = self.plan(len)?;
            log::debug!(
                "{len} carries exceed the span of one warp, partitioning over {} warps",
                plan.num_warps
            );
            let mut upper = self.alloc::<T>(plan.num_warps)?;
            self.partition_phase(None, current, &plan, &mut upper, op);
            levels.push((plan, upper));
        }

        while let Some((plan, upper)) = levels.pop() {
            let current = match levels.last_mut() {
                Some((_, below)) => below.as_mut_slice(),
                None => &mut *carries,
            };
            self.update_phase(current, &plan, upper.as_slice(), UpdateMode::Inclusive, op);
        }

        Ok(())
    }

    /// Folds each warp's carry-in into its interval.
    fn update_phase<T, F>(
        &self,
        dst: &mut [T],
        plan: &LaunchPlan,
        carries: &[T],
        mode: UpdateMode,
        op: &F,
    ) where
        T: Clone + Send + Sync,
        F: Fn(&T, &T) -> T + Sync,
    {
        let interval_size = plan.interval_size;
        let warps_per_block = plan.warps_per_block();
        let name = match mode {
            UpdateMode::Inclusive => "inclusive_update",
            UpdateMode::Exclusive => "exclusive_update",
        };

        self.launch(name, plan.num_blocks, plan.block_size, || {
            dst.par_chunks_mut(interval_size)
                .enumerate()
                .with_min_len(warps_per_block)
                .for_each_init(WarpScratch::new, |scratch, (warp, dst)| {
                    let carry = match mode {
                        // The first interval has no carry-in and is already
                        // globally correct.
                        UpdateMode::Inclusive if warp == 0 => return,
                        UpdateMode::Inclusive => &carries[warp - 1],
                        UpdateMode::Exclusive => &carries[warp],
                    };
                    update_interval(dst, carry, mode, scratch, op);
                })
        });
    }
}

fn destination<T>(dst: &mut [T], required: usize) -> Result<&mut [T]> {
    let capacity = dst.len();
    dst.get_mut(..required)
        .ok_or(ScanError::DestinationTooSmall { required, capacity })
}

fn scan_on_host<T, F>(carries: &mut [T], op: &F) -> Result<()>
where
    T: Clone,
    F: Fn(&T, &T) -> T,
{
    let mut host = copy_to_host(carries)?;
    sequential_scan_in_place(&mut host, op);
    copy_from_host(carries, &host);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{sequential_exclusive_scan, sequential_scan};
    use crate::{
        config::{CarryStrategy, ScanConfig},
        device::Device,
        error::ScanError,
    };
    use itertools::Itertools;

    fn sum(a: &u64, b: &u64) -> u64 {
        a.wrapping_add(*b)
    }

    fn concat(a: &String, b: &String) -> String {
        format!("{a}{b}")
    }

    /// 2 warps per block and at most 4 resident blocks, so even small inputs
    /// are spread over several intervals of several chunks.
    fn small_device(strategy: CarryStrategy) -> Device {
        Device::new(
            ScanConfig::default()
                .with_worker_threads(4)
                .with_block_size(64)
                .with_max_resident_threads(256)
                .with_carry_strategy(strategy),
        )
        .unwrap()
    }

    /// 64 resident single-warp blocks and a one-warp carry span, which forces
    /// long inputs through more than one level of carries.
    fn deep_device(strategy: CarryStrategy) -> Device {
        Device::new(
            ScanConfig::default()
                .with_worker_threads(4)
                .with_block_size(32)
                .with_max_resident_threads(32 * 64)
                .with_carry_span(32)
                .with_carry_strategy(strategy),
        )
        .unwrap()
    }

    fn expected_inclusive(xs: &[u64]) -> Vec<u64> {
        let mut ys = vec![0; xs.len()];
        sequential_scan(xs, &mut ys, sum);
        ys
    }

    fn expected_exclusive(xs: &[u64], init: u64) -> Vec<u64> {
        let mut ys = vec![0; xs.len()];
        sequential_exclusive_scan(xs, &mut ys, init, sum);
        ys
    }

    fn pseudo_random(len: usize) -> Vec<u64> {
        (0..len as u64)
            .map(|i| i.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 40)
            .collect_vec()
    }

    #[test]
    fn sequential_scans() {
        let mut ys = [0u64; 5];
        sequential_scan(&[1, 2, 3, 4, 5], &mut ys, sum);
        assert_eq!(ys, [1, 3, 6, 10, 15]);

        let mut ys = [0u64; 4];
        sequential_exclusive_scan(&[1, 2, 3, 4], &mut ys, 0, sum);
        assert_eq!(ys, [0, 1, 3, 6]);
    }

    #[test]
    fn inclusive_example() {
        let device = small_device(CarryStrategy::Device);
        let mut dst = [0u64; 5];
        device.inclusive_scan(&[1, 2, 3, 4, 5], &mut dst, sum).unwrap();
        assert_eq!(dst, [1, 3, 6, 10, 15]);
    }

    #[test]
    fn exclusive_example() {
        let device = small_device(CarryStrategy::Device);
        let mut dst = [0u64; 4];
        device.exclusive_scan(&[1, 2, 3, 4], &mut dst, 0, sum).unwrap();
        assert_eq!(dst, [0, 1, 3, 6]);
    }

    #[test]
    fn empty_input_does_no_work() {
        let device = Device::new(
            ScanConfig::default()
                .with_worker_threads(1)
                .with_scratch_limit_bytes(0),
        )
        .unwrap();
        let before = device.stats();

        let mut dst = [9u64; 3];
        device.inclusive_scan(&[], &mut dst, sum).unwrap();
        device.exclusive_scan(&[], &mut dst, 1, sum).unwrap();

        assert_eq!(dst, [9, 9, 9]);
        assert_eq!(device.stats(), before);
    }

    #[test]
    fn lengths_off_the_warp_width() {
        let device = small_device(CarryStrategy::Device);
        for n in [1, 31, 33, 63, 65, 127, 129, 255, 257, 1000] {
            let src = pseudo_random(n);

            let mut dst = vec![0; n];
            device.inclusive_scan(&src, &mut dst, sum).unwrap();
            assert_eq!(dst, expected_inclusive(&src), "inclusive n = {n}");

            let mut dst = vec![0; n];
            device.exclusive_scan(&src, &mut dst, 7, sum).unwrap();
            assert_eq!(dst, expected_exclusive(&src, 7), "exclusive n = {n}");
        }
    }

    #[test]
    fn multi_level_carries() {
        for strategy in [CarryStrategy::Device, CarryStrategy::Host] {
            let device = deep_device(strategy);
            let src = pseudo_random(100_000);

            let mut dst = vec![0; src.len()];
            device.inclusive_scan(&src, &mut dst, sum).unwrap();
            assert_eq!(dst, expected_inclusive(&src), "{strategy}");

            let mut dst = vec![0; src.len()];
            device.exclusive_scan(&src, &mut dst, 3, sum).unwrap();
            assert_eq!(dst, expected_exclusive(&src, 3), "{strategy}");
        }
    }

    #[test]
    fn device_and_host_carries_are_identical() {
        let device = deep_device(CarryStrategy::Device);
        for len in [0, 1, 2, 31, 32, 33, 64, 65, 500, 2049, 40_000] {
            let carries = pseudo_random(len);

            let mut on_device = carries.clone();
            device
                .scan_carries(&mut on_device, CarryStrategy::Device, sum)
                .unwrap();

            let mut on_host = carries.clone();
            device
                .scan_carries(&mut on_host, CarryStrategy::Host, sum)
                .unwrap();

            let mut mixed = carries.clone();
            device
                .scan_carries(&mut mixed, CarryStrategy::Auto { host_threshold: 64 }, sum)
                .unwrap();

            assert_eq!(on_device, on_host, "len = {len}");
            assert_eq!(mixed, on_host, "len = {len}");
            assert_eq!(on_host, expected_inclusive(&carries), "len = {len}");
        }
    }

    #[test]
    fn device_and_host_carries_keep_operand_order() {
        let device = deep_device(CarryStrategy::Device);
        let carries = (0..300).map(|i| format!("{i};")).collect_vec();

        let mut on_device = carries.clone();
        device
            .scan_carries(&mut on_device, CarryStrategy::Device, concat)
            .unwrap();
        let mut on_host = carries.clone();
        device
            .scan_carries(&mut on_host, CarryStrategy::Host, concat)
            .unwrap();

        assert_eq!(on_device, on_host);
        assert_eq!(on_device[299], carries.concat());
    }

    #[test]
    fn non_commutative_operator() {
        let device = deep_device(CarryStrategy::Device);
        let src = (0..2500).map(|i| format!("{i},")).collect_vec();

        let mut dst = vec![String::new(); src.len()];
        device.inclusive_scan(&src, &mut dst, concat).unwrap();
        for i in [0, 31, 32, 33, 1000, 2499] {
            assert_eq!(dst[i], src[..=i].concat(), "i = {i}");
        }

        let mut dst = vec![String::new(); src.len()];
        device
            .exclusive_scan(&src, &mut dst, "init,".to_string(), concat)
            .unwrap();
        assert_eq!(dst[0], "init,");
        for i in [1, 32, 33, 1000, 2499] {
            assert_eq!(dst[i], format!("init,{}", src[..i].concat()), "i = {i}");
        }
    }

    #[test]
    fn in_place_scans() {
        let device = small_device(CarryStrategy::Device);
        let src = pseudo_random(777);

        let mut data = src.clone();
        device.inclusive_scan_in_place(&mut data, sum).unwrap();
        assert_eq!(data, expected_inclusive(&src));

        let mut data = src.clone();
        device.exclusive_scan_in_place(&mut data, 11, sum).unwrap();
        assert_eq!(data, expected_exclusive(&src, 11));
    }

    #[test]
    fn writes_only_the_required_prefix() {
        let device = small_device(CarryStrategy::Device);
        let mut dst = [0u64; 6];
        dst[5] = 42;
        device.inclusive_scan(&[1, 1, 1, 1, 1], &mut dst, sum).unwrap();
        assert_eq!(dst, [1, 2, 3, 4, 5, 42]);
    }

    #[test]
    fn rejects_short_destination() {
        let device = small_device(CarryStrategy::Device);
        let mut dst = [0u64; 2];
        let err = device.inclusive_scan(&[1, 2, 3], &mut dst, sum).unwrap_err();
        assert!(matches!(
            err,
            ScanError::DestinationTooSmall {
                required: 3,
                capacity: 2
            }
        ));
    }

    #[test]
    fn scratch_exhaustion_fails_the_call() {
        let device = Device::new(
            ScanConfig::default()
                .with_worker_threads(1)
                .with_scratch_limit_bytes(8),
        )
        .unwrap();
        let src = pseudo_random(1000);
        let mut dst = vec![0; src.len()];
        let err = device.inclusive_scan(&src, &mut dst, sum).unwrap_err();
        assert!(matches!(err, ScanError::OutOfMemory { .. }));
        assert_eq!(device.stats().launches, 0);
    }

    #[test]
    fn one_allocation_and_three_launches_per_scan() {
        let device = small_device(CarryStrategy::Device);
        let src = pseudo_random(1000);
        let mut dst = vec![0; src.len()];
        device.inclusive_scan(&src, &mut dst, sum).unwrap();

        let stats = device.stats();
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.launches, 3);
        assert_eq!(stats.scratch_bytes, 8 * std::mem::size_of::<u64>());
    }

    #[test]
    fn default_device_entry_points() {
        let mut dst = [0u64; 3];
        super::inclusive_scan(&[2, 3, 4], &mut dst, sum).unwrap();
        assert_eq!(dst, [2, 5, 9]);

        super::exclusive_scan(&[2, 3, 4], &mut dst, 1, sum).unwrap();
        assert_eq!(dst, [1, 3, 6]);
    }
}
