// Two nodes wired back to back: whatever `local` sends is drained by its
// event loop straight into `remote`'s mailbox, standing in for a transport.
//
//   cargo run --example loopback --features tracing -- 10000
use dmxp_mq::trace::init_tracing;
use dmxp_mq::{Dispatch, EventLoop, MqError, Node, NodeBuilder, NodeState};
use sha2::{Digest, Sha256};
use std::env;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const PRODUCERS: usize = 2;

/// Transport adapter: hands every drained payload to the peer node.
struct Wire {
    peer: Arc<Node>,
}

impl Dispatch for Wire {
    fn on_send(&mut self, payload: &[u8]) {
        loop {
            match self.peer.deliver_inbound(payload) {
                Ok(()) => return,
                // the peer's mailbox is full; wait for the reader
                Err(MqError::QueueFull) => thread::sleep(Duration::from_micros(10)),
                Err(e) => {
                    eprintln!("Wire: dropping payload: {}", e);
                    return;
                }
            }
        }
    }

    fn on_control(&mut self, payload: &[u8]) {
        println!("Wire: control message {:?}", String::from_utf8_lossy(payload));
    }
}

fn digest(i: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("message_{}", i).as_bytes());
    format!("{:x}", hasher.finalize())
}

fn main() -> io::Result<()> {
    init_tracing();

    let num_messages: usize = match env::args().nth(1) {
        Some(arg) => arg
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?,
        None => 10_000,
    };

    let (remote, remote_loop) = EventLoop::start(
        NodeBuilder::new().with_inbound_capacity(256),
        |_: &[u8]| {},
    )?;
    let (local, local_loop) = EventLoop::start(
        NodeBuilder::new().with_outbound_capacity(256),
        Wire {
            peer: remote.clone(),
        },
    )?;

    // Handle Ctrl+C by closing the sending side; everything it accepted still
    // reaches the peer.
    let local_for_handler = local.clone();
    ctrlc::set_handler(move || {
        let _ = local_for_handler.close();
    })
    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    println!("Loopback: sending {} messages from {} producers", num_messages, PRODUCERS);
    let start = Instant::now();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let local = local.clone();
            thread::spawn(move || {
                let mut sent = 0usize;
                for i in (p..num_messages).step_by(PRODUCERS) {
                    // Format: "message_number:hash"
                    let message = format!("{}:{}", i, digest(i));
                    loop {
                        match local.send(message.as_bytes()) {
                            Ok(()) => {
                                sent += 1;
                                break;
                            }
                            Err(e) if e.is_backpressure() => thread::yield_now(),
                            Err(_) => return sent,
                        }
                    }
                }
                sent
            })
        })
        .collect();

    let mut received = 0usize;
    let mut mismatched = 0usize;
    while received < num_messages {
        match remote.recv_wait(Some(Duration::from_millis(500))) {
            Ok(message) => {
                let text = String::from_utf8_lossy(message.payload());
                let verified = text
                    .split_once(':')
                    .and_then(|(i, hash)| i.parse::<usize>().ok().map(|i| digest(i) == hash))
                    .unwrap_or(false);
                if !verified {
                    mismatched += 1;
                    eprintln!("Loopback: hash mismatch in {:?}", text);
                }
                received += 1;
                if received % 1000 == 0 {
                    println!("Received {} messages", received);
                }
            }
            Err(MqError::TimedOut) => {
                // interrupted: stop once the sender is gone and nothing is left
                if local.state() == NodeState::Closed && remote.active_recv_count() == 0 {
                    break;
                }
            }
            Err(e) => {
                eprintln!("Loopback: receive failed: {}", e);
                break;
            }
        }
    }

    let sent: usize = producers
        .into_iter()
        .map(|handle| handle.join().unwrap_or(0))
        .sum();
    let elapsed = start.elapsed();

    local.send_control(b"shutdown").ok();
    local.close()?;
    remote.close()?;
    let _ = local_loop.join();
    let _ = remote_loop.join();

    println!(
        "Loopback: sent {}, received {}, mismatched {} in {:.2?}",
        sent, received, mismatched, elapsed
    );
    if mismatched > 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "hash mismatch"));
    }
    Ok(())
}
