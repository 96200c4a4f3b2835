use dmxp_mq::Core::Signal;
use dmxp_mq::MQ::Queue::Validity;
use dmxp_mq::{Dispatch, MqError, SendChannel};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn channel(capacity: usize) -> (SendChannel, Arc<AtomicUsize>) {
    let wakes = Arc::new(AtomicUsize::new(0));
    let counter = wakes.clone();
    let channel = SendChannel::new(
        capacity,
        32,
        Arc::new(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        }),
    )
    .unwrap();
    (channel, wakes)
}

#[derive(Default)]
struct Recorder {
    sent: Vec<Vec<u8>>,
    control: Vec<Vec<u8>>,
}

impl Dispatch for Recorder {
    fn on_send(&mut self, payload: &[u8]) {
        self.sent.push(payload.to_vec());
    }

    fn on_control(&mut self, payload: &[u8]) {
        self.control.push(payload.to_vec());
    }
}

#[test]
fn queue_full_after_capacity_enqueues() {
    for capacity in 1..=8 {
        let (channel, _) = channel(capacity);
        for i in 0..capacity {
            channel.enqueue(&[i as u8]).unwrap();
        }
        assert_eq!(channel.enqueue(b"overflow"), Err(MqError::QueueFull));
        assert_eq!(channel.available(), 0);

        let mut recorder = Recorder::default();
        assert!(channel.drain_one(&mut recorder));
        assert_eq!(recorder.sent, vec![vec![0u8]]);
        channel.enqueue(b"fits").unwrap();
        assert_eq!(channel.enqueue(b"overflow"), Err(MqError::QueueFull));
    }
}

#[test]
fn capacity_four_scenario() {
    let (channel, _) = channel(4);
    for payload in [b"A", b"B", b"C", b"D"] {
        channel.enqueue(payload).unwrap();
    }
    assert_eq!(channel.enqueue(b"E"), Err(MqError::QueueFull));

    let mut recorder = Recorder::default();
    assert_eq!(channel.drain_limit(&mut recorder, 1), 1);
    assert_eq!(recorder.sent, vec![b"A".to_vec()]);
    channel.enqueue(b"E").unwrap();

    assert_eq!(channel.drain(&mut recorder), 4);
    let sent: Vec<u8> = recorder.sent.concat();
    assert_eq!(sent, b"ABCDE");
}

#[test]
fn each_enqueue_wakes_the_consumer() {
    let (channel, wakes) = channel(4);
    channel.enqueue(b"one").unwrap();
    channel.enqueue(b"two").unwrap();
    assert_eq!(wakes.load(Ordering::Relaxed), 2);

    // a rejected enqueue has nothing to drain
    channel.enqueue(b"3").unwrap();
    channel.enqueue(b"4").unwrap();
    channel.enqueue(b"5").unwrap_err();
    assert_eq!(wakes.load(Ordering::Relaxed), 4);
}

#[test]
fn payloads_round_trip() {
    let (channel, _) = channel(64);
    let mut rng = fastrand::Rng::with_seed(0x5eed);
    let payloads: Vec<Vec<u8>> = (0..64)
        .map(|_| {
            let len = rng.usize(0..48);
            (0..len).map(|_| rng.u8(..)).collect()
        })
        .collect();
    for payload in &payloads {
        channel.enqueue(payload).unwrap();
    }

    let mut received = Vec::new();
    channel.drain(&mut |payload: &[u8]| received.push(payload.to_vec()));
    assert_eq!(received, payloads);
    assert_eq!(channel.pending(), 0);
}

#[test]
fn control_messages_reach_on_control() {
    let (channel, _) = channel(4);
    channel.enqueue(b"data").unwrap();
    channel.enqueue_control(b"flush").unwrap();
    channel.enqueue(b"more").unwrap();

    let mut recorder = Recorder::default();
    assert_eq!(channel.drain(&mut recorder), 3);
    assert_eq!(recorder.sent, vec![b"data".to_vec(), b"more".to_vec()]);
    assert_eq!(recorder.control, vec![b"flush".to_vec()]);
}

#[test]
fn closed_channel_keeps_queued_messages() {
    let (channel, wakes) = channel(4);
    channel.enqueue(b"before").unwrap();
    channel.close();
    assert!(channel.is_closed());
    assert!(!channel.is_drained());
    // close wakes the consumer for the final drain
    assert_eq!(wakes.load(Ordering::Relaxed), 2);

    assert_eq!(channel.enqueue(b"after"), Err(MqError::Closed));
    assert_eq!(channel.enqueue_control(b"after"), Err(MqError::Closed));

    let mut recorder = Recorder::default();
    assert_eq!(channel.drain(&mut recorder), 1);
    assert_eq!(recorder.sent, vec![b"before".to_vec()]);
    assert!(channel.is_drained());

    // idempotent
    channel.close();
    assert_eq!(wakes.load(Ordering::Relaxed), 2);
}

#[test]
fn drain_on_empty_channel_is_a_no_op() {
    let (mut channel, _) = channel(2);
    let mut recorder = Recorder::default();
    assert_eq!(channel.drain(&mut recorder), 0);
    assert!(!channel.drain_one(&mut recorder));
    assert_eq!(channel.validate_ready(2, 2), Validity::Valid);
}

#[test]
fn producers_and_a_signalled_consumer() {
    let signal = Arc::new(Signal::new());
    let channel = Arc::new(SendChannel::new(32, 16, signal.clone()).unwrap());
    let producers = 4;
    let per_producer = 2_000u32;

    let consumer = {
        let channel = channel.clone();
        let signal = signal.clone();
        thread::spawn(move || {
            let mut seen = vec![0u32; producers];
            let mut total = 0usize;
            loop {
                let epoch = signal.epoch();
                total += channel.drain(&mut |payload: &[u8]| {
                    let producer = payload[0] as usize;
                    let value = u32::from_le_bytes([payload[1], payload[2], payload[3], payload[4]]);
                    // a single consumer sees each producer's messages in order
                    assert_eq!(seen[producer], value);
                    seen[producer] += 1;
                });
                if channel.is_drained() {
                    break;
                }
                signal.wait(epoch, Some(Duration::from_millis(50)));
            }
            (total, seen)
        })
    };

    let handles: Vec<_> = (0..producers as u8)
        .map(|p| {
            let channel = channel.clone();
            thread::spawn(move || {
                for i in 0..per_producer {
                    let mut payload = [p; 5];
                    payload[1..].copy_from_slice(&i.to_le_bytes());
                    while let Err(err) = channel.enqueue(&payload) {
                        assert!(err.is_backpressure());
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    channel.close();

    let (total, seen) = consumer.join().unwrap();
    assert_eq!(total, producers * per_producer as usize);
    assert!(seen.iter().all(|&n| n == per_producer));
}
