//! Capture raw audio from an RTP stream.
//!
//! Listens on a UDP port and writes every received payload byte to a file
//! (or stdout) until the byte limit is reached or the sender goes quiet.
//!
//! Usage:
//!   cargo run --example rtp_capture -- [port] [output] [max_bytes]
//!
//! Arguments:
//!   [1] Local port (default: 5004)
//!   [2] Output file, "-" for stdout (default: capture.raw)
//!   [3] Stop after this many bytes (default: 320000, 10 s of 16 kHz mono PCM16)
//!
//! Set RUST_LOG=debug to see every decoded RTP header.

use std::fs::File;
use std::io::{self, Write};
use std::time::Duration;

use rtp_audio_client::{RtpClient, RtpClientConfig};

/// Give up after this long without audio.
const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "-h" || a == "--help") {
        print_usage();
        return;
    }

    let port: u16 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(5004);
    let output = args.get(2).map(|s| s.as_str()).unwrap_or("capture.raw");
    let max_bytes: usize = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(320_000);

    let mut sink: Box<dyn Write> = if output == "-" {
        Box::new(io::stdout())
    } else {
        match File::create(output) {
            Ok(file) => Box::new(file),
            Err(e) => {
                eprintln!("ERROR: cannot create {}: {}", output, e);
                return;
            }
        }
    };

    let mut client = match RtpClient::new(RtpClientConfig::new(port)) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return;
        }
    };

    if let Err(e) = client.start() {
        eprintln!("ERROR: {}", e);
        return;
    }

    eprintln!("Capturing up to {} bytes on port {} into {}", max_bytes, port, output);

    let buffer = client.buffer().clone();
    let mut scratch = vec![0u8; 4096];
    let mut total = 0usize;

    while total < max_bytes {
        let want = scratch.len().min(max_bytes - total);
        match buffer.read_timeout(&mut scratch[..want], IDLE_TIMEOUT) {
            Some(0) => break,
            Some(n) => {
                if let Err(e) = sink.write_all(&scratch[..n]) {
                    eprintln!("ERROR: write failed: {}", e);
                    break;
                }
                total += n;
            }
            None => {
                eprintln!("No audio for {:?}, stopping", IDLE_TIMEOUT);
                break;
            }
        }
    }

    let _ = sink.flush();
    client.stop();

    let stats = client.stats();
    eprintln!(
        "Captured {} bytes from {} packets ({} malformed, {} dropped, {} sequence gaps)",
        total, stats.packets_received, stats.malformed_packets, stats.packets_dropped, stats.sequence_gaps
    );

    client.dispose();
}

fn print_usage() {
    eprintln!("Usage: rtp_capture [port] [output|-] [max_bytes]");
}
