//! Demo driver: producers push random keys while consumers drain the
//! minimum, then stdout gets overall throughput, pop-latency percentiles,
//! and an ASCII latency histogram.
//!
//! ```text
//! cargo run --release --example throughput -- --producers 8 --consumers 8 --iters 100000
//! ```

use kule_pq::PriorityQueue;
use rand::Rng;
use std::env;
use std::process;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

fn main() {
    let mut num_producers = 4usize;
    let mut num_consumers = 4usize;
    let mut iterations = 100_000usize;

    let mut args = env::args().skip(1);
    while let Some(flag) = args.next() {
        let mut take = |name: &str| {
            args.next()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or_else(|| {
                    eprintln!("{name} expects a number");
                    process::exit(2);
                })
        };
        match flag.as_str() {
            "--producers" => num_producers = take("--producers"),
            "--consumers" => num_consumers = take("--consumers"),
            "--iters" => iterations = take("--iters"),
            other => {
                eprintln!("unknown flag: {other}");
                eprintln!("usage: throughput [--producers N] [--consumers N] [--iters N]");
                process::exit(2);
            }
        }
    }

    let pq = Arc::new(PriorityQueue::new());
    let producers_done = Arc::new(AtomicBool::new(false));
    let total_pushes = Arc::new(AtomicUsize::new(0));
    let total_pops = Arc::new(AtomicUsize::new(0));

    let bench_start = Instant::now();

    let mut producers = Vec::with_capacity(num_producers);
    for _ in 0..num_producers {
        let pq = pq.clone();
        let total_pushes = total_pushes.clone();
        producers.push(thread::spawn(move || {
            let mut rng = rand::thread_rng();
            for _ in 0..iterations {
                let value: u64 = rng.gen_range(0..u64::MAX / 2);
                pq.push(value);
                total_pushes.fetch_add(1, Ordering::Relaxed);
            }
        }));
    }

    let mut consumers = Vec::with_capacity(num_consumers);
    for _ in 0..num_consumers {
        let pq = pq.clone();
        let producers_done = producers_done.clone();
        let total_pops = total_pops.clone();
        consumers.push(thread::spawn(move || {
            let mut latencies =
                Vec::with_capacity(iterations * num_producers / num_consumers.max(1) + 1);
            loop {
                let t = Instant::now();
                match pq.pop() {
                    Some(_) => {
                        latencies.push(t.elapsed().as_nanos() as u64);
                        total_pops.fetch_add(1, Ordering::Relaxed);
                    }
                    None => {
                        if producers_done.load(Ordering::Acquire) {
                            break;
                        }
                        thread::yield_now();
                    }
                }
            }
            latencies
        }));
    }

    for handle in producers {
        handle.join().unwrap();
    }
    producers_done.store(true, Ordering::Release);

    let mut pops: Vec<u64> = Vec::new();
    for handle in consumers {
        pops.extend(handle.join().unwrap());
    }
    let elapsed = bench_start.elapsed();

    let pushed = total_pushes.load(Ordering::Relaxed);
    let popped = total_pops.load(Ordering::Relaxed);
    let throughput = (pushed + popped) as f64 / elapsed.as_secs_f64();
    println!("Throughput: {throughput:.0} ops/sec");

    // Conservation: everything pushed must come back out exactly once.
    if pushed != popped {
        eprintln!("Conservation violated: pushed={pushed}, popped={popped}");
        process::exit(1);
    }
    println!("Conservation: {pushed} pushed == {popped} popped");

    pops.sort_unstable();
    if pops.is_empty() {
        return;
    }

    let percentile = |p: f64| {
        let idx = ((p / 100.0) * pops.len() as f64) as usize;
        pops[idx.min(pops.len() - 1)]
    };
    println!(
        "Latency percentiles (pop) [ns]: p50={}, p99={}, p999={}",
        percentile(50.0),
        percentile(99.0),
        percentile(99.9)
    );

    const BINS: usize = 10;
    let min_lat = pops[0];
    let max_lat = pops[pops.len() - 1];
    let range = (max_lat - min_lat + 1) as usize;
    let mut counts = [0usize; BINS];
    for &v in &pops {
        let bin = ((v - min_lat) as usize * BINS / range).min(BINS - 1);
        counts[bin] += 1;
    }
    println!("Latency histogram (pop) [ns]:");
    for (i, count) in counts.iter().enumerate() {
        let start = min_lat as usize + range * i / BINS;
        let end = min_lat as usize + range * (i + 1) / BINS;
        let bar = 50 * count / pops.len();
        println!("[{start}..{end}) : {}", "#".repeat(bar));
    }
}
