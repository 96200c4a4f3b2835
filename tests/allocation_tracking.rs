// Allocation tracking tests for the send path
//
// Note: Tests using dhat are marked with #[serial_test::serial] because
// dhat only allows one profiler to run at a time. They will run sequentially.
//
// # Run all allocation tracking tests
// cargo test --test allocation_tracking -- --nocapture

use dmxp_mq::MQ::Structs::Kind;
use dmxp_mq::{MessagePool, NodeBuilder, SendChannel};
use std::sync::Arc;

#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

#[test]
#[serial_test::serial]
fn test_pool_steady_state_with_dhat() {
    println!("\n--- Running message pool with dhat ---");
    let _dhat = dhat::Profiler::builder().testing().build();

    let pool = MessagePool::new(64, 128).unwrap();
    let payload = [0xabu8; 100];
    let mut buf = Vec::with_capacity(128);

    // warm-up: first locks set up per-thread lock bookkeeping
    pool.enqueue(Kind::Data, &payload).unwrap();
    pool.dequeue_into(&mut buf).unwrap();

    let before = dhat::HeapStats::get();
    for _ in 0..10_000 {
        pool.enqueue(Kind::Data, &payload).unwrap();
        let kind = pool.dequeue_into(&mut buf).unwrap();
        assert_eq!(kind, Kind::Data);
    }
    let after = dhat::HeapStats::get();
    println!("Processed 10000 messages (len: {})", buf.len());

    println!(
        "Blocks allocated: before {}, after {}",
        before.total_blocks, after.total_blocks
    );
    dhat::assert_eq!(after.total_blocks, before.total_blocks);
}

#[test]
#[serial_test::serial]
fn test_channel_send_drain_with_dhat() {
    println!("\n--- Running send channel with dhat ---");
    let _dhat = dhat::Profiler::builder().testing().build();

    let channel = SendChannel::new(256, 64, Arc::new(|| {})).unwrap();
    let payload = [7u8; 48];
    let mut bytes = 0usize;

    channel.enqueue(&payload).unwrap();
    channel.drain(&mut |p: &[u8]| bytes += p.len());

    let before = dhat::HeapStats::get();
    for _ in 0..100 {
        for _ in 0..200 {
            channel.enqueue(&payload).unwrap();
        }
        let drained = channel.drain(&mut |p: &[u8]| bytes += p.len());
        assert_eq!(drained, 200);
    }
    let after = dhat::HeapStats::get();

    println!("✓ {} bytes dispatched", bytes);
    dhat::assert_eq!(after.total_blocks, before.total_blocks);
}

#[test]
#[serial_test::serial]
fn test_node_send_drain_with_dhat() {
    println!("\n--- Running node send/drain with dhat ---");
    let _dhat = dhat::Profiler::builder().testing().build();

    let node = NodeBuilder::new()
        .with_outbound_capacity(32)
        .with_outbound_message_size(32)
        .build(Arc::new(|| {}), |_: &[u8]| {})
        .unwrap();
    node.start().unwrap();
    node.send(b"warm-up").unwrap();
    node.drain();

    let before = dhat::HeapStats::get();
    for _ in 0..5_000 {
        node.send(b"steady state").unwrap();
        node.send_control(b"tick").unwrap();
        assert_eq!(node.drain(), 2);
    }
    let after = dhat::HeapStats::get();

    dhat::assert_eq!(after.total_blocks, before.total_blocks);
    node.close().unwrap();
}

#[test]
fn test_send_drain_with_memory_stats() {
    println!("\n--- Running send channel with memory-stats ---");
    use memory_stats::memory_stats;

    let before = memory_stats();
    if let Some(usage) = before {
        println!("Memory before: physical {} bytes, virtual {} bytes", usage.physical_mem, usage.virtual_mem);
    }

    let channel = SendChannel::new(1024, 256, Arc::new(|| {})).unwrap();
    let payload = [1u8; 200];
    let mut dispatched = 0usize;
    for _ in 0..100 {
        for _ in 0..1024 {
            channel.enqueue(&payload).unwrap();
        }
        dispatched += channel.drain(&mut |_: &[u8]| {});
    }
    assert_eq!(dispatched, 100 * 1024);

    let after = memory_stats();
    if let (Some(before), Some(after)) = (before, after) {
        let delta = after.physical_mem as i64 - before.physical_mem as i64;
        println!("Memory delta: {} bytes ({:.2} KB)", delta, delta as f64 / 1024.0);
        println!("  (includes the {} KB reserved up front by the pool)", 1024 * 256 / 1024);
    }
}
