//! Per-stream reassembly of captured TCP payload into frames.
//!
//! Captured segments arrive in arbitrary chunks: a frame may span several
//! segments and one segment may carry several frames. Each TCP 4-tuple gets
//! its own buffer with at most one expected header at a time.

use crate::error::ProtocolError;
use crate::frame::{Frame, FrameHeader, HeaderLimits};
use crate::MAX_BUFFER_SIZE;
use bytes::{Buf, BytesMut};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::SocketAddrV4;
use std::str::FromStr;
use tracing::{debug, warn};

/// Identifies one direction of one TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamKey {
    pub src: SocketAddrV4,
    pub dst: SocketAddrV4,
}

impl StreamKey {
    pub fn new(src: SocketAddrV4, dst: SocketAddrV4) -> Self {
        Self { src, dst }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.src, self.dst)
    }
}

/// How the reassembler recovers from a bad header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReassemblyMode {
    /// Slide one byte and retry; bytes after a frame start the next frame.
    #[default]
    Stream,
    /// Drop the whole buffer; anything past a frame's length is discarded.
    SingleFrame,
}

impl FromStr for ReassemblyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stream" => Ok(ReassemblyMode::Stream),
            "single_frame" | "single-frame" | "single" => Ok(ReassemblyMode::SingleFrame),
            other => Err(format!("unknown reassembly mode: {}", other)),
        }
    }
}

impl fmt::Display for ReassemblyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReassemblyMode::Stream => write!(f, "stream"),
            ReassemblyMode::SingleFrame => write!(f, "single_frame"),
        }
    }
}

/// Reassembler configuration.
#[derive(Debug, Clone)]
pub struct ReassemblyConfig {
    pub limits: HeaderLimits,
    /// Per-stream buffer cap in bytes.
    pub max_buffer: usize,
    pub mode: ReassemblyMode,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            limits: HeaderLimits::default(),
            max_buffer: MAX_BUFFER_SIZE,
            mode: ReassemblyMode::Stream,
        }
    }
}

/// Output of [`Reassembler::feed`].
#[derive(Debug)]
pub enum DecodeEvent {
    /// A complete, validated frame.
    Frame(Frame),
    /// Buffered bytes were dropped.
    Discarded { key: StreamKey, error: ProtocolError },
}

/// Counters kept across all streams.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReassemblyStats {
    pub bytes_received: u64,
    pub frames_emitted: u64,
    pub frames_discarded: u64,
    pub bytes_trimmed: u64,
    pub streams_closed: u64,
    pub discards: BTreeMap<&'static str, u64>,
}

impl ReassemblyStats {
    fn record_discard(&mut self, error: &ProtocolError) {
        self.frames_discarded += 1;
        *self.discards.entry(error.kind()).or_insert(0) += 1;
    }
}

#[derive(Debug, Default)]
struct StreamBuffer {
    buf: BytesMut,
    expected: Option<FrameHeader>,
    resyncing: bool,
}

impl StreamBuffer {
    fn reset(&mut self) {
        self.buf.clear();
        self.expected = None;
        self.resyncing = false;
    }

    fn is_idle(&self) -> bool {
        self.buf.is_empty() && self.expected.is_none()
    }
}

/// Turns per-stream payload chunks into frames.
pub struct Reassembler {
    config: ReassemblyConfig,
    streams: HashMap<StreamKey, StreamBuffer>,
    stats: ReassemblyStats,
}

impl Reassembler {
    pub fn new(config: ReassemblyConfig) -> Self {
        Self {
            config,
            streams: HashMap::new(),
            stats: ReassemblyStats::default(),
        }
    }

    pub fn config(&self) -> &ReassemblyConfig {
        &self.config
    }

    pub fn stats(&self) -> &ReassemblyStats {
        &self.stats
    }

    /// Number of streams with buffered state.
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Bytes currently buffered for `key`.
    pub fn buffered(&self, key: &StreamKey) -> usize {
        self.streams.get(key).map(|s| s.buf.len()).unwrap_or(0)
    }

    /// Drops all state for a stream (FIN/RST seen). Returns the bytes dropped.
    pub fn close_stream(&mut self, key: &StreamKey) -> usize {
        match self.streams.remove(key) {
            Some(stream) => {
                self.stats.streams_closed += 1;
                if !stream.buf.is_empty() {
                    debug!(stream = %key, bytes = stream.buf.len(), "dropping partial frame on close");
                }
                stream.buf.len()
            }
            None => 0,
        }
    }

    /// Drops every stream's buffered bytes, keeping the counters. Returns the
    /// number of streams dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.streams.len();
        self.streams.clear();
        dropped
    }

    /// Appends a payload chunk for `key` and returns every event it produced.
    pub fn feed(&mut self, key: StreamKey, data: &[u8]) -> Vec<DecodeEvent> {
        let mut events = Vec::new();
        if data.is_empty() {
            return events;
        }
        self.stats.bytes_received += data.len() as u64;

        let config = &self.config;
        let stats = &mut self.stats;
        let stream = self.streams.entry(key).or_default();

        stream.buf.extend_from_slice(data);

        loop {
            let header = match stream.expected {
                Some(header) => header,
                None => {
                    let Some(header) = FrameHeader::peek(&stream.buf) else {
                        break;
                    };
                    match Self::check_header(&header, config) {
                        Ok(()) => {
                            stream.resyncing = false;
                            stream.expected = Some(header);
                            header
                        }
                        Err(error) => {
                            if !stream.resyncing {
                                debug!(stream = %key, error = %error, "invalid frame header");
                                stats.record_discard(&error);
                                events.push(DecodeEvent::Discarded { key, error });
                            }
                            match config.mode {
                                ReassemblyMode::Stream => {
                                    stream.buf.advance(1);
                                    stream.resyncing = true;
                                    continue;
                                }
                                ReassemblyMode::SingleFrame => {
                                    stream.reset();
                                    break;
                                }
                            }
                        }
                    }
                }
            };

            let total = header.total_length as usize;
            if stream.buf.len() < total {
                break;
            }

            if config.mode == ReassemblyMode::SingleFrame && stream.buf.len() > total {
                let extra = stream.buf.len() - total;
                debug!(stream = %key, extra, "trimming bytes past frame end");
                stats.bytes_trimmed += extra as u64;
                stream.buf.truncate(total);
            }

            stream.expected = None;
            let frame = match Frame::decode(&mut stream.buf, &config.limits) {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(error) => {
                    stats.record_discard(&error);
                    stream.reset();
                    events.push(DecodeEvent::Discarded { key, error });
                    break;
                }
            };
            debug!(
                stream = %key,
                command = frame.command_code,
                body = header.body_len(),
                "frame reassembled"
            );
            stats.frames_emitted += 1;
            events.push(DecodeEvent::Frame(frame));

            if config.mode == ReassemblyMode::SingleFrame {
                stream.reset();
                break;
            }
        }

        // Only what is left after complete frames counts against the cap.
        if stream.buf.len() > config.max_buffer {
            let error = ProtocolError::BufferOverflow {
                size: stream.buf.len(),
                max: config.max_buffer,
            };
            warn!(stream = %key, error = %error, "reassembly buffer overflow, resetting stream");
            stats.record_discard(&error);
            stream.reset();
            events.push(DecodeEvent::Discarded { key, error });
        }

        if stream.is_idle() {
            self.streams.remove(&key);
        }
        events
    }

    fn check_header(header: &FrameHeader, config: &ReassemblyConfig) -> Result<(), ProtocolError> {
        header.validate(&config.limits)?;
        if header.total_length as usize > config.max_buffer {
            return Err(ProtocolError::BufferOverflow {
                size: header.total_length as usize,
                max: config.max_buffer,
            });
        }
        Ok(())
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(ReassemblyConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HEADER_SIZE, MAX_FRAME_LEN};
    use bytes::{BufMut, Bytes};
    use proptest::prelude::*;
    use std::net::Ipv4Addr;

    fn key() -> StreamKey {
        StreamKey::new(
            SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 20201),
            SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 5), 51000),
        )
    }

    fn frames(events: Vec<DecodeEvent>) -> Vec<Frame> {
        events
            .into_iter()
            .filter_map(|e| match e {
                DecodeEvent::Frame(f) => Some(f),
                DecodeEvent::Discarded { .. } => None,
            })
            .collect()
    }

    fn single_frame() -> Reassembler {
        Reassembler::new(ReassemblyConfig {
            mode: ReassemblyMode::SingleFrame,
            ..Default::default()
        })
    }

    fn raw_header(len: u32, cmd: u16, reserved: u16) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u32_le(len);
        buf.put_u16_le(cmd);
        buf.put_u16_le(reserved);
        buf.to_vec()
    }

    #[test]
    fn test_split_across_chunks() {
        let frame = Frame::new(44, Bytes::from_static(b"hello world"));
        let encoded = frame.encode().unwrap();
        let mut r = Reassembler::default();

        assert!(r.feed(key(), &encoded[..3]).is_empty());
        assert!(r.feed(key(), &encoded[3..12]).is_empty());
        assert_eq!(r.buffered(&key()), 12);

        let out = frames(r.feed(key(), &encoded[12..]));
        assert_eq!(out, vec![frame]);
        assert_eq!(r.buffered(&key()), 0);
        assert_eq!(r.stream_count(), 0);
    }

    #[test]
    fn test_back_to_back_frames_stream_mode() {
        let a = Frame::new(18, Bytes::from_static(b"aaa"));
        let b = Frame::new(44, Bytes::from_static(b"bbbb"));
        let mut data = a.encode().unwrap().to_vec();
        data.extend_from_slice(&b.encode().unwrap());
        data.extend_from_slice(&raw_header(20, 44, 0)[..5]);

        let mut r = Reassembler::default();
        let out = frames(r.feed(key(), &data));
        assert_eq!(out, vec![a, b]);
        assert_eq!(r.buffered(&key()), 5);
        assert_eq!(r.stats().frames_emitted, 2);
    }

    #[test]
    fn test_back_to_back_frames_single_mode_trims() {
        let a = Frame::new(18, Bytes::from_static(b"aaa"));
        let b = Frame::new(44, Bytes::from_static(b"bbbb"));
        let mut data = a.encode().unwrap().to_vec();
        data.extend_from_slice(&b.encode().unwrap());

        let mut r = single_frame();
        let out = frames(r.feed(key(), &data));
        assert_eq!(out, vec![a]);
        assert_eq!(r.buffered(&key()), 0);
        assert_eq!(r.stats().bytes_trimmed, 12);
    }

    #[test]
    fn test_resync_after_garbage() {
        let frame = Frame::new(44, Bytes::from_static(b"payload"));
        let mut data = vec![0xff, 0xee, 0xdd];
        data.extend_from_slice(&frame.encode().unwrap());

        let mut r = Reassembler::default();
        let events = r.feed(key(), &data);
        let discards = events
            .iter()
            .filter(|e| matches!(e, DecodeEvent::Discarded { .. }))
            .count();
        assert_eq!(discards, 1);
        assert_eq!(frames(events), vec![frame]);
        assert_eq!(r.stats().frames_discarded, 1);
    }

    #[test]
    fn test_garbage_discards_whole_buffer_in_single_mode() {
        let frame = Frame::new(44, Bytes::from_static(b"payload"));
        let mut data = vec![0xff, 0xee, 0xdd];
        data.extend_from_slice(&frame.encode().unwrap());

        let mut r = single_frame();
        assert!(frames(r.feed(key(), &data)).is_empty());
        assert_eq!(r.buffered(&key()), 0);
    }

    #[test]
    fn test_frame_near_cap_followed_by_next_frame() {
        let mut r = Reassembler::new(ReassemblyConfig {
            max_buffer: 64,
            ..Default::default()
        });
        let big = Frame::new(44, Bytes::from(vec![7u8; 52]));
        let small = Frame::new(18, Bytes::from_static(b"x"));
        let encoded = big.encode().unwrap();
        assert_eq!(encoded.len(), 60);

        assert!(r.feed(key(), &encoded[..50]).is_empty());
        let mut rest = encoded[50..].to_vec();
        rest.extend_from_slice(&small.encode().unwrap());

        let events = r.feed(key(), &rest);
        assert_eq!(frames(events), vec![big, small]);
        assert!(r.stats().discards.is_empty());
        assert_eq!(r.stream_count(), 0);
    }

    #[test]
    fn test_leftover_over_cap_resets() {
        let mut r = Reassembler::new(ReassemblyConfig {
            max_buffer: 4,
            ..Default::default()
        });
        let events = r.feed(key(), &raw_header(20, 44, 0)[..6]);
        assert!(matches!(
            events.as_slice(),
            [DecodeEvent::Discarded {
                error: ProtocolError::BufferOverflow { size: 6, max: 4 },
                ..
            }]
        ));
        assert_eq!(r.stats().discards.get("buffer_overflow"), Some(&1));
        assert_eq!(r.buffered(&key()), 0);
    }

    #[test]
    fn test_frame_larger_than_buffer_cap_rejected_at_header() {
        let mut r = Reassembler::new(ReassemblyConfig {
            max_buffer: 64,
            mode: ReassemblyMode::SingleFrame,
            ..Default::default()
        });
        let events = r.feed(key(), &raw_header(1000, 44, 0));
        assert_eq!(events.len(), 1);
        assert_eq!(r.buffered(&key()), 0);
    }

    #[test]
    fn test_streams_are_independent() {
        let other = StreamKey::new(
            SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 20202),
            SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 5), 51001),
        );
        let a = Frame::new(18, Bytes::from_static(b"first"));
        let b = Frame::new(44, Bytes::from_static(b"second"));
        let ea = a.encode().unwrap();
        let eb = b.encode().unwrap();

        let mut r = Reassembler::default();
        assert!(r.feed(key(), &ea[..6]).is_empty());
        assert!(r.feed(other, &eb[..9]).is_empty());
        assert_eq!(frames(r.feed(key(), &ea[6..])), vec![a]);
        assert_eq!(frames(r.feed(other, &eb[9..])), vec![b]);
    }

    #[test]
    fn test_close_stream_drops_partial() {
        let frame = Frame::new(44, Bytes::from_static(b"partial"));
        let encoded = frame.encode().unwrap();
        let mut r = Reassembler::default();
        r.feed(key(), &encoded[..10]);
        assert_eq!(r.close_stream(&key()), 10);
        assert_eq!(r.buffered(&key()), 0);
        assert_eq!(r.close_stream(&key()), 0);
    }

    #[test]
    fn test_clear_keeps_counters() {
        let frame = Frame::new(44, Bytes::from_static(b"x"));
        let encoded = frame.encode().unwrap();
        let mut r = Reassembler::default();
        r.feed(key(), &encoded);
        r.feed(key(), &encoded[..4]);
        assert_eq!(r.clear(), 1);
        assert_eq!(r.stream_count(), 0);
        assert_eq!(r.stats().frames_emitted, 1);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("stream".parse::<ReassemblyMode>(), Ok(ReassemblyMode::Stream));
        assert_eq!(
            "single_frame".parse::<ReassemblyMode>(),
            Ok(ReassemblyMode::SingleFrame)
        );
        assert!("bogus".parse::<ReassemblyMode>().is_err());
    }

    fn invalid_header() -> impl Strategy<Value = (u32, u16, u16)> {
        let cmd = prop_oneof![Just(18u16), Just(44u16)];
        let reserved = prop_oneof![Just(0u16), Just(256u16)];
        prop_oneof![
            (0u32..8, cmd.clone(), reserved.clone()),
            (MAX_FRAME_LEN + 1..=u32::MAX, cmd.clone(), reserved.clone()),
            (
                8u32..4096,
                cmd.clone(),
                any::<u16>().prop_filter("reserved must be invalid", |r| *r != 0 && *r != 256)
            ),
            (
                8u32..4096,
                any::<u16>().prop_filter("command must be unknown", |c| *c != 18 && *c != 44),
                reserved
            ),
        ]
    }

    proptest! {
        #[test]
        fn test_any_split_yields_one_frame(
            cmd in prop_oneof![Just(18u16), Just(44u16)],
            reserved in prop_oneof![Just(0u16), Just(256u16)],
            body in proptest::collection::vec(any::<u8>(), 0..512),
            cuts in proptest::collection::vec(any::<prop::sample::Index>(), 0..8),
            single in any::<bool>(),
        ) {
            let frame = Frame::new(cmd, Bytes::from(body)).with_reserved(reserved);
            let encoded = frame.encode().unwrap();

            let mut points: Vec<usize> = cuts.iter().map(|i| i.index(encoded.len() + 1)).collect();
            points.push(0);
            points.push(encoded.len());
            points.sort_unstable();
            points.dedup();

            let mut r = if single { single_frame() } else { Reassembler::default() };
            let mut out = Vec::new();
            for pair in points.windows(2) {
                out.extend(frames(r.feed(key(), &encoded[pair[0]..pair[1]])));
            }

            prop_assert_eq!(out.len(), 1);
            prop_assert_eq!(out[0].command_code, cmd);
            prop_assert_eq!(&out[0].body, &frame.body);
            prop_assert_eq!(r.buffered(&key()), 0);
        }

        #[test]
        fn test_invalid_header_never_emits((len, cmd, reserved) in invalid_header(), single in any::<bool>()) {
            let mut r = if single { single_frame() } else { Reassembler::default() };
            let events = r.feed(key(), &raw_header(len, cmd, reserved));

            prop_assert!(frames(events).is_empty());
            prop_assert_eq!(r.stats().frames_discarded, 1);
            prop_assert!(r.buffered(&key()) < HEADER_SIZE);
            if single {
                prop_assert_eq!(r.buffered(&key()), 0);
            }
        }
    }
}
