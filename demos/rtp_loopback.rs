//! RTP loopback test.
//!
//! Sends a generated 16 kHz mono PCM16 sine tone as RTP packets to a local
//! client and reads it back through the audio stream, checking that every
//! byte arrives in order.
//!
//! Usage:
//!   cargo run --example rtp_loopback -- [packets] [payload_bytes]
//!
//! Arguments:
//!   [1] Number of packets to send (default: 200)
//!   [2] Payload bytes per packet (default: 640, 20 ms at 16 kHz mono PCM16)

use std::io::Read;
use std::net::{Ipv4Addr, UdpSocket};
use std::thread;
use std::time::{Duration, Instant};

use rtp_audio_client::{RtpClient, RtpClientConfig, RtpPacketBuilder};

const SAMPLE_RATE: f32 = 16_000.0;
const TONE_HZ: f32 = 440.0;
/// Payload type 11: L16 mono
const PT_L16_MONO: u8 = 11;

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let packets: usize = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(200);
    let payload_bytes: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(640);
    let samples_per_packet = (payload_bytes / 2) as u32;

    println!("RTP Loopback Test");
    println!("=================\n");

    let config = RtpClientConfig::new(0)
        .with_interface(Ipv4Addr::LOCALHOST)
        .with_log_headers(false);

    let mut client = match RtpClient::new(config) {
        Ok(client) => client,
        Err(e) => {
            println!("ERROR: {}", e);
            return;
        }
    };

    if let Err(e) = client.start() {
        println!("ERROR: {}", e);
        return;
    }

    let target = match client.local_addr() {
        Some(addr) => addr,
        None => {
            println!("ERROR: client is not listening");
            return;
        }
    };
    println!("Client listening on {}", target);

    let tone = generate_tone(packets * payload_bytes);
    let expected = tone.clone();

    let sender = thread::spawn(move || {
        let socket = match UdpSocket::bind("127.0.0.1:0") {
            Ok(s) => s,
            Err(e) => {
                println!("ERROR: sender bind failed: {}", e);
                return;
            }
        };
        let mut builder = RtpPacketBuilder::new(PT_L16_MONO);
        let frame = Duration::from_micros(samples_per_packet as u64 * 1_000_000 / SAMPLE_RATE as u64);

        for chunk in tone.chunks(payload_bytes) {
            if socket.send_to(builder.build_packet(chunk, samples_per_packet), target).is_err() {
                break;
            }
            thread::sleep(frame);
        }
    });

    let mut stream = client.audio_stream();
    let expected_len = expected.len();
    let started = Instant::now();
    let reader = thread::spawn(move || {
        let mut received = vec![0u8; expected_len];
        stream.read_exact(&mut received).map(|()| received)
    });

    let _ = sender.join();

    // Lost datagrams would leave the reader waiting; stopping ends the stream
    let deadline = Instant::now() + Duration::from_secs(2);
    while !reader.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    client.stop();

    let result = match reader.join() {
        Ok(result) => result,
        Err(_) => {
            println!("ERROR: reader thread panicked");
            return;
        }
    };

    match result {
        Ok(received) if received == expected => {
            println!("OK: {} bytes received in order in {:?}", received.len(), started.elapsed());
        }
        Ok(_) => println!("FAIL: audio differs from what was sent"),
        Err(e) => println!("FAIL: stream ended early: {}", e),
    }

    let stats = client.stats();
    println!(
        "Packets: {} received, {} malformed, {} dropped, {} sequence gaps",
        stats.packets_received, stats.malformed_packets, stats.packets_dropped, stats.sequence_gaps
    );

    client.dispose();
}

/// Little-endian PCM16 sine tone.
fn generate_tone(bytes: usize) -> Vec<u8> {
    (0..bytes / 2)
        .flat_map(|i| {
            let t = i as f32 / SAMPLE_RATE;
            let sample = ((t * TONE_HZ * std::f32::consts::TAU).sin() * 16_000.0) as i16;
            sample.to_le_bytes()
        })
        .collect()
}
