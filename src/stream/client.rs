//! RTP receiving client.
//!
//! Binds a UDP port, runs a dedicated receive thread that decodes each
//! datagram's header and pushes the payload into the shared audio buffer.
//! The client is one-shot: `Idle → Listening → Stopped`. A stopped client
//! cannot listen again; build a new one instead.

use std::net::SocketAddrV4;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::{OverflowPolicy, RtpClientConfig};
use crate::error::{Result, RtpError};
use crate::rtp::{PayloadMode, RtpPacket, RtpSocket};

use super::{AtomicStats, AudioRingBuffer, AudioStream, EventSink, LogSink, StatsSnapshot};

/// Largest datagram the receive loop accepts.
const MAX_DATAGRAM_SIZE: usize = 65536;

/// Lifecycle state of an [`RtpClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// Constructed, socket not yet bound
    Idle,
    /// Socket bound and receive loop started
    Listening,
    /// Stopped; terminal for this instance
    Stopped,
}

/// Receive-only RTP audio client.
pub struct RtpClient {
    config: RtpClientConfig,
    /// Audio buffer shared with consumers
    buffer: Arc<AudioRingBuffer>,
    /// Flag to stop receiver thread; false once the loop has exited
    running: Arc<AtomicBool>,
    state: ReceiverState,
    /// Receiver thread handle
    receiver_thread: Option<JoinHandle<()>>,
    /// Actual bound address while listening
    local_addr: Option<SocketAddrV4>,
    stats: Arc<AtomicStats>,
    sink: Arc<dyn EventSink>,
}

impl RtpClient {
    /// Create a client that reports through the `log` facade.
    pub fn new(config: RtpClientConfig) -> Result<Self> {
        Self::with_sink(config, Arc::new(LogSink))
    }

    /// Create a client reporting diagnostics to `sink`.
    pub fn with_sink(config: RtpClientConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        config.validate()?;
        let buffer = Arc::new(AudioRingBuffer::new(config.buffer_capacity)?);

        Ok(Self {
            config,
            buffer,
            running: Arc::new(AtomicBool::new(false)),
            state: ReceiverState::Idle,
            receiver_thread: None,
            local_addr: None,
            stats: Arc::new(AtomicStats::new()),
            sink,
        })
    }

    /// Bind the configured port and start the receive thread.
    ///
    /// Bind failures are returned as [`RtpError::Bind`] and leave the client idle.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            ReceiverState::Idle => {}
            ReceiverState::Listening => return Err(RtpError::AlreadyStarted),
            ReceiverState::Stopped => return Err(RtpError::NotRestartable),
        }

        let socket = RtpSocket::bind(
            self.config.port,
            self.config.interface,
            self.config.poll_interval,
            self.config.recv_buffer_size,
        )?;
        let local_addr = socket.local_addr();

        let receive_loop = ReceiveLoop {
            socket,
            port: local_addr.port(),
            running: self.running.clone(),
            buffer: self.buffer.clone(),
            stats: self.stats.clone(),
            sink: self.sink.clone(),
            log_headers: self.config.log_headers,
            overflow: self.config.overflow,
            payload_mode: self.config.payload_mode,
        };

        self.running.store(true, Ordering::SeqCst);

        let spawned = thread::Builder::new()
            .name(format!("rtp-recv-{}", local_addr.port()))
            .spawn(move || receive_loop.run());

        match spawned {
            Ok(handle) => {
                self.sink.listening(local_addr);
                self.receiver_thread = Some(handle);
                self.local_addr = Some(local_addr);
                self.state = ReceiverState::Listening;
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(RtpError::Spawn(e))
            }
        }
    }

    /// Stop receiving and wait for the receive thread to exit.
    ///
    /// Closes the audio buffer so a producer blocked on a full buffer wakes
    /// up; the consumer can still drain what was buffered and then sees end of
    /// stream. The socket is released before this returns. Idempotent.
    pub fn stop(&mut self) {
        match self.state {
            ReceiverState::Stopped => return,
            ReceiverState::Idle => {
                self.buffer.close();
                self.state = ReceiverState::Stopped;
                return;
            }
            ReceiverState::Listening => {}
        }

        self.running.store(false, Ordering::SeqCst);
        self.buffer.close();

        if let Some(thread) = self.receiver_thread.take() {
            let _ = thread.join();
        }

        let port = self.local_addr.take().map_or(self.config.port, |addr| addr.port());
        self.state = ReceiverState::Stopped;
        self.sink.stopped(port);
    }

    /// Stop if needed and release the audio buffer.
    ///
    /// Consumers still holding an [`AudioStream`] read the remaining bytes and
    /// then end of stream.
    pub fn dispose(mut self) {
        self.stop();
        self.buffer.close();
    }

    /// True while the receive loop is running.
    pub fn listening(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// The configured port.
    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// The bound address while listening (resolves port 0).
    pub fn local_addr(&self) -> Option<SocketAddrV4> {
        self.local_addr
    }

    /// A readable handle over the audio buffer.
    pub fn audio_stream(&self) -> AudioStream {
        AudioStream::new(self.buffer.clone())
    }

    pub fn buffer(&self) -> &Arc<AudioRingBuffer> {
        &self.buffer
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for RtpClient {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for RtpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtpClient")
            .field("port", &self.config.port)
            .field("state", &self.state)
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

/// Everything the receive thread owns.
struct ReceiveLoop {
    socket: RtpSocket,
    port: u16,
    running: Arc<AtomicBool>,
    buffer: Arc<AudioRingBuffer>,
    stats: Arc<AtomicStats>,
    sink: Arc<dyn EventSink>,
    log_headers: bool,
    overflow: OverflowPolicy,
    payload_mode: PayloadMode,
}

impl ReceiveLoop {
    fn run(self) {
        raise_thread_priority();

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let mut last_sequence: Option<u16> = None;

        let failure = loop {
            if !self.running.load(Ordering::SeqCst) {
                break None;
            }

            let len = match self.socket.recv(&mut buf) {
                Ok(Some(len)) => len,
                Ok(None) => continue,
                Err(e) => break Some(e),
            };

            if let Err(e) = self.handle_datagram(&buf[..len], &mut last_sequence) {
                break Some(e);
            }
        };

        // A closed buffer or socket after stop() is the normal way out
        let was_running = self.running.swap(false, Ordering::SeqCst);
        let cause = failure.filter(|e| was_running || !e.is_closed());
        self.sink.loop_exited(self.port, cause.as_ref());
    }

    /// Decode one datagram and buffer its payload.
    ///
    /// Only errors that should end the loop are returned.
    fn handle_datagram(&self, datagram: &[u8], last_sequence: &mut Option<u16>) -> Result<()> {
        let packet = match RtpPacket::parse(datagram, self.payload_mode) {
            Ok(packet) => packet,
            Err(e) => {
                self.stats.malformed_packets.fetch_add(1, Ordering::Relaxed);
                self.sink.malformed(datagram.len(), &e);
                return Ok(());
            }
        };

        let header = packet.header;
        self.stats.packets_received.fetch_add(1, Ordering::Relaxed);
        self.stats.last_ssrc.store(header.ssrc, Ordering::Relaxed);

        if let Some(prev) = *last_sequence {
            if header.sequence != prev.wrapping_add(1) {
                self.stats.sequence_gaps.fetch_add(1, Ordering::Relaxed);
            }
        }
        *last_sequence = Some(header.sequence);

        if self.log_headers {
            self.sink.header(&header, packet.payload.len());
        }

        let written = match self.overflow {
            OverflowPolicy::Block => self.buffer.write(packet.payload).map(|()| true),
            OverflowPolicy::DropPacket => self.buffer.try_write(packet.payload),
        };

        match written {
            Ok(true) => {
                self.stats
                    .bytes_received
                    .fetch_add(packet.payload.len() as u64, Ordering::Relaxed);
                Ok(())
            }
            Ok(false) | Err(RtpError::WriteTooLarge { .. }) => {
                self.stats.packets_dropped.fetch_add(1, Ordering::Relaxed);
                self.sink.dropped(packet.payload.len(), self.buffer.free_space());
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn raise_thread_priority() {
    #[cfg(windows)]
    {
        use windows_sys::Win32::System::Threading::{
            GetCurrentThread, SetThreadPriority, THREAD_PRIORITY_ABOVE_NORMAL,
        };
        unsafe {
            SetThreadPriority(GetCurrentThread(), THREAD_PRIORITY_ABOVE_NORMAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtp::{RtpHeader, RtpPacketBuilder};
    use crate::stream::NullSink;
    use parking_lot::Mutex;
    use std::io::Read;
    use std::net::{Ipv4Addr, UdpSocket};
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct RecordingSink {
        listens: Mutex<Vec<SocketAddrV4>>,
        headers: Mutex<Vec<RtpHeader>>,
        malformed: Mutex<Vec<usize>>,
        dropped: Mutex<Vec<usize>>,
        exits: Mutex<Vec<Option<String>>>,
    }

    impl EventSink for RecordingSink {
        fn listening(&self, addr: SocketAddrV4) {
            self.listens.lock().push(addr);
        }

        fn header(&self, header: &RtpHeader, _payload_len: usize) {
            self.headers.lock().push(*header);
        }

        fn malformed(&self, len: usize, _error: &RtpError) {
            self.malformed.lock().push(len);
        }

        fn dropped(&self, payload_len: usize, _free_space: usize) {
            self.dropped.lock().push(payload_len);
        }

        fn loop_exited(&self, _port: u16, cause: Option<&RtpError>) {
            self.exits.lock().push(cause.map(|e| e.to_string()));
        }
    }

    fn loopback_config() -> RtpClientConfig {
        RtpClientConfig::new(0)
            .with_interface(Ipv4Addr::LOCALHOST)
            .with_recv_buffer_size(0)
    }

    fn started(config: RtpClientConfig) -> (RtpClient, Arc<RecordingSink>, UdpSocket) {
        let sink = Arc::new(RecordingSink::default());
        let mut client = RtpClient::with_sink(config, sink.clone()).unwrap();
        client.start().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.connect(client.local_addr().unwrap()).unwrap();
        (client, sink, sender)
    }

    fn quiet_client(config: RtpClientConfig) -> RtpClient {
        RtpClient::with_sink(config, Arc::new(NullSink)).unwrap()
    }

    fn wait_for<F: Fn() -> bool>(condition: F) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn read_exact_timeout(buffer: &AudioRingBuffer, len: usize) -> Vec<u8> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut out = Vec::new();
        let mut scratch = [0u8; 256];
        while out.len() < len {
            assert!(Instant::now() < deadline, "only {} of {} bytes arrived", out.len(), len);
            if let Some(n) = buffer.read_timeout(&mut scratch, Duration::from_millis(50)) {
                assert_ne!(n, 0, "stream ended early");
                out.extend_from_slice(&scratch[..n]);
            }
        }
        out
    }

    #[test]
    fn test_payloads_reach_stream_in_order() {
        let (client, _sink, sender) = started(loopback_config());
        let mut builder = RtpPacketBuilder::with_ssrc(0x1234, 0);

        let mut expected = Vec::new();
        for i in 0..5u8 {
            let payload = vec![i; 40];
            expected.extend_from_slice(&payload);
            sender.send(builder.build_packet(&payload, 20)).unwrap();
        }

        assert_eq!(read_exact_timeout(client.buffer(), expected.len()), expected);
        wait_for(|| client.stats().bytes_received == 200);

        let stats = client.stats();
        assert_eq!(stats.packets_received, 5);
        assert_eq!(stats.bytes_received, 200);
        assert_eq!(stats.sequence_gaps, 0);
        assert_eq!(stats.last_ssrc, 0x1234);
    }

    #[test]
    fn test_headers_reported_when_enabled() {
        let (client, sink, sender) = started(loopback_config());

        let datagram = [
            0x80, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0xA0, 0x00, 0x00, 0x00, 0x01, 0xAB, 0xCD,
        ];
        sender.send(&datagram).unwrap();

        assert_eq!(read_exact_timeout(client.buffer(), 2), vec![0xAB, 0xCD]);

        let headers = sink.headers.lock();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].version, 2);
        assert_eq!(headers[0].sequence, 1);
        assert_eq!(headers[0].timestamp, 160);
        assert_eq!(headers[0].ssrc, 1);
    }

    #[test]
    fn test_headers_not_reported_when_disabled() {
        let (client, sink, sender) = started(loopback_config().with_log_headers(false));
        let mut builder = RtpPacketBuilder::new(0);
        sender.send(builder.build_packet(&[1, 2, 3], 3)).unwrap();

        assert_eq!(read_exact_timeout(client.buffer(), 3), vec![1, 2, 3]);
        assert!(sink.headers.lock().is_empty());
    }

    #[test]
    fn test_malformed_datagram_does_not_stall_loop() {
        let (client, sink, sender) = started(loopback_config());
        let mut builder = RtpPacketBuilder::new(0);

        sender.send(&[0x80, 0x00, 0x00, 0x01, 0x00]).unwrap();
        sender.send(builder.build_packet(&[7, 7, 7], 3)).unwrap();

        assert_eq!(read_exact_timeout(client.buffer(), 3), vec![7, 7, 7]);
        assert!(client.listening());
        assert_eq!(client.stats().malformed_packets, 1);
        assert_eq!(*sink.malformed.lock(), vec![5]);
    }

    #[test]
    fn test_sequence_gaps_counted() {
        let (client, _sink, sender) = started(loopback_config());
        let mut builder = RtpPacketBuilder::with_ssrc(1, 0);

        builder.set_sequence(10);
        sender.send(builder.build_packet(&[1], 1)).unwrap();
        sender.send(builder.build_packet(&[2], 1)).unwrap();
        builder.set_sequence(20);
        sender.send(builder.build_packet(&[3], 1)).unwrap();

        assert_eq!(read_exact_timeout(client.buffer(), 3), vec![1, 2, 3]);
        assert_eq!(client.stats().sequence_gaps, 1);
    }

    #[test]
    fn test_rfc3550_mode_skips_csrc() {
        let config = loopback_config().with_payload_mode(PayloadMode::Rfc3550);
        let (client, _sink, sender) = started(config);

        let header = RtpHeader {
            version: 2,
            padding: false,
            extension: false,
            csrc_count: 1,
            marker: false,
            payload_type: 0,
            sequence: 1,
            timestamp: 0,
            ssrc: 9,
        };
        let mut datagram = vec![0u8; 12];
        header.encode(&mut datagram);
        datagram.extend_from_slice(&[0xEE; 4]);
        datagram.extend_from_slice(&[1, 2]);
        sender.send(&datagram).unwrap();

        assert_eq!(read_exact_timeout(client.buffer(), 2), vec![1, 2]);
    }

    #[test]
    fn test_start_stop_releases_port() {
        let sink = Arc::new(RecordingSink::default());
        let mut client = RtpClient::with_sink(loopback_config(), sink.clone()).unwrap();
        assert_eq!(client.state(), ReceiverState::Idle);

        client.start().unwrap();
        assert!(client.listening());
        assert_eq!(client.state(), ReceiverState::Listening);
        let addr = client.local_addr().unwrap();
        assert_eq!(*sink.listens.lock(), vec![addr]);

        let started_at = Instant::now();
        client.stop();
        assert!(started_at.elapsed() < Duration::from_secs(2));

        assert!(!client.listening());
        assert_eq!(client.state(), ReceiverState::Stopped);
        assert_eq!(client.local_addr(), None);
        assert_eq!(*sink.exits.lock(), vec![None]);

        UdpSocket::bind(addr).expect("port should be free after stop");
    }

    #[test]
    fn test_repeated_cycles_reuse_port() {
        let mut first = quiet_client(loopback_config());
        first.start().unwrap();
        let port = first.local_addr().unwrap().port();
        first.stop();

        for _ in 0..20 {
            let config = loopback_config();
            let mut client = quiet_client(RtpClientConfig { port, ..config });
            client.start().unwrap();
            assert_eq!(client.port(), port);
            client.stop();
        }
    }

    #[test]
    fn test_lifecycle_errors() {
        let mut client = quiet_client(loopback_config());
        client.start().unwrap();
        assert!(matches!(client.start(), Err(RtpError::AlreadyStarted)));

        client.stop();
        client.stop();
        assert!(matches!(client.start(), Err(RtpError::NotRestartable)));
    }

    #[test]
    fn test_bind_error_surfaces() {
        let holder = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = holder.local_addr().unwrap().port();

        let sink = Arc::new(RecordingSink::default());
        let config = RtpClientConfig {
            port,
            ..loopback_config()
        };
        let mut client = RtpClient::with_sink(config, sink.clone()).unwrap();

        match client.start() {
            Err(RtpError::Bind { port: reported, .. }) => assert_eq!(reported, port),
            other => panic!("expected bind error, got {:?}", other),
        }
        assert_eq!(client.state(), ReceiverState::Idle);
        assert!(!client.listening());
        assert!(sink.listens.lock().is_empty());
    }

    #[test]
    fn test_stop_unblocks_producer_on_full_buffer() {
        let config = loopback_config().with_buffer_capacity(16);
        let (mut client, sink, sender) = started(config);
        let mut builder = RtpPacketBuilder::new(0);

        for i in 0..3u8 {
            sender.send(builder.build_packet(&[i; 12], 12)).unwrap();
        }
        wait_for(|| client.stats().packets_received >= 2);

        let started_at = Instant::now();
        client.stop();
        assert!(started_at.elapsed() < Duration::from_secs(2));
        assert_eq!(*sink.exits.lock(), vec![None]);

        // The first payload was buffered; the blocked one was abandoned
        let mut stream = client.audio_stream();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, vec![0u8; 12]);
    }

    #[test]
    fn test_drop_policy_discards_whole_payloads() {
        let config = loopback_config()
            .with_buffer_capacity(16)
            .with_overflow(OverflowPolicy::DropPacket);
        let (client, sink, sender) = started(config);
        let mut builder = RtpPacketBuilder::new(0);

        for i in 0..3u8 {
            sender.send(builder.build_packet(&[i; 12], 12)).unwrap();
        }
        wait_for(|| sink.dropped.lock().len() == 2);

        let stats = client.stats();
        assert_eq!(stats.packets_received, 3);
        assert_eq!(stats.packets_dropped, 2);
        assert_eq!(stats.bytes_received, 12);
        assert_eq!(*sink.dropped.lock(), vec![12, 12]);
        assert_eq!(client.buffer().len(), 12);
    }

    #[test]
    fn test_dispose_ends_stream() {
        let (client, _sink, sender) = started(loopback_config());
        let mut builder = RtpPacketBuilder::new(0);
        sender.send(builder.build_packet(&[5; 8], 8)).unwrap();
        wait_for(|| client.buffer().len() == 8);

        let mut stream = client.audio_stream();
        client.dispose();

        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, vec![5; 8]);
        assert!(stream.buffer().is_closed());
    }

    #[test]
    fn test_stop_before_start() {
        let mut client = quiet_client(loopback_config());
        let mut stream = client.audio_stream();
        client.stop();

        assert_eq!(client.state(), ReceiverState::Stopped);
        let mut out = [0u8; 4];
        assert_eq!(stream.read(&mut out).unwrap(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = loopback_config().with_buffer_capacity(0);
        assert!(matches!(RtpClient::new(config), Err(RtpError::Config(_))));
    }
}
