use dmxp_mq::MQ::Queue::{BoundedRingQueue, Validity};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn mpmc_correctness_many_threads() {
    let queue = Arc::new(BoundedRingQueue::<u32, u32>::new(1000).unwrap());

    let producers = 4;
    let consumers = 4;
    let msgs_per_producer = 5000u32;
    let total_msgs = producers * msgs_per_producer as usize;

    let mut handles = vec![];

    // Spawn producers
    for p_id in 0..producers as u32 {
        let queue = queue.clone();
        handles.push(thread::spawn(move || {
            for i in 0..msgs_per_producer {
                while !queue.push(p_id, i) {
                    thread::yield_now();
                }
            }
        }));
    }

    // Each consumer checks per-producer FIFO order of what it sees, and the
    // checksum proves nothing was lost or duplicated overall.
    let received = Arc::new(AtomicUsize::new(0));
    let checksum = Arc::new(AtomicU64::new(0));
    for _ in 0..consumers {
        let queue = queue.clone();
        let received = received.clone();
        let checksum = checksum.clone();
        handles.push(thread::spawn(move || {
            let mut last = vec![None::<u32>; producers];
            loop {
                if let Some((p_id, i)) = queue.pop() {
                    let last = &mut last[p_id as usize];
                    assert!(last.map_or(true, |prev| prev < i), "reordered within producer");
                    *last = Some(i);
                    checksum.fetch_add(u64::from(p_id) * 1_000_000 + u64::from(i), Ordering::Relaxed);
                    received.fetch_add(1, Ordering::Relaxed);
                } else {
                    if received.load(Ordering::Relaxed) >= total_msgs {
                        break;
                    }
                    thread::yield_now();
                }
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    let expected: u64 = (0..producers as u64)
        .map(|p| {
            (0..u64::from(msgs_per_producer))
                .map(|i| p * 1_000_000 + i)
                .sum::<u64>()
        })
        .sum();
    assert_eq!(received.load(Ordering::SeqCst), total_msgs);
    assert_eq!(checksum.load(Ordering::SeqCst), expected);

    let mut queue = Arc::try_unwrap(queue).ok().unwrap();
    assert_eq!(queue.validate(0, 0), Validity::Valid);
    assert!(queue.is_empty());
}

#[test]
fn mpmc_throughput_print() {
    let queue = Arc::new(BoundedRingQueue::<u64, [u8; 8]>::new(4096).unwrap());

    let start = std::time::Instant::now();
    let count = 100_000u64;

    let q_prod = queue.clone();
    let p = thread::spawn(move || {
        for i in 0..count {
            while !q_prod.push(i, [0u8; 8]) {
                std::hint::spin_loop();
            }
        }
    });

    let q_cons = queue.clone();
    let c = thread::spawn(move || {
        let mut rx = 0;
        while rx < count {
            if q_cons.pop().is_some() {
                rx += 1;
            } else {
                std::hint::spin_loop();
            }
        }
    });

    p.join().unwrap();
    c.join().unwrap();

    let elapsed = start.elapsed();
    println!(
        "Throughput: {:.2} million ops/sec",
        (count as f64 / elapsed.as_secs_f64()) / 1_000_000.0
    );
}
