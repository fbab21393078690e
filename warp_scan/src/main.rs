use itertools::Itertools;
use std::{error::Error, time::Instant};
use warp_scan::{Device, ScanConfig};

pub fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let device = Device::new(ScanConfig::from_env()?)?;
    println!(
        "device: {} workers, {} resident threads",
        device.worker_threads(),
        device.limits().max_resident_threads
    );

    let xs = [1u32; 40];
    let mut ys = [0u32; 40];
    warp_scan::sequential_scan(&xs, &mut ys, |a, b| a + b);
    println!("xs: {:?}", xs);
    println!("ys: {:?}", ys);

    device.exclusive_scan(&xs, &mut ys, 0, |a, b| a + b)?;
    println!("ys: {:?}", ys);

    let words = ["warp", "-", "level", "-", "scan"].map(String::from);
    let mut joined = vec![String::new(); words.len()];
    device.inclusive_scan(&words, &mut joined, |a, b| format!("{a}{b}"))?;
    println!("joined: {:?}", joined);

    let n = 10_000_000u64;
    let xs = (0..n).map(|i| i % 7).collect_vec();
    let mut ys = vec![0u64; xs.len()];
    let now = Instant::now();
    device.inclusive_scan(&xs, &mut ys, |a, b| a + b)?;
    let elapsed = now.elapsed();
    println!("\tdevice scan:\t{:.2?}", elapsed);

    let mut expected = vec![0u64; xs.len()];
    let now = Instant::now();
    warp_scan::sequential_scan(&xs, &mut expected, |a, b| a + b);
    let elapsed = now.elapsed();
    println!("\tsequential scan:\t{:.2?}", elapsed);

    assert_eq!(ys, expected);
    println!("stats: {:?}", device.stats());
    Ok(())
}
