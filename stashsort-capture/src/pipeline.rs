//! Packet-to-message pipeline run by the capture worker.

use crate::backend::CaptureFilter;
use crate::packet::{parse_packet, RawPacket};
use serde::Serialize;
use stashsort_protocol::{
    CommandSet, DecodeEvent, Message, MessageRouter, Reassembler, ReassemblyConfig,
    ReassemblyStats, StreamKey,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Receives every successfully decoded message.
pub type MessageSink = Arc<dyn Fn(Message) + Send + Sync>;

/// Counters for one pipeline run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    pub packets_seen: u64,
    /// Packets that were not IPv4/TCP.
    pub packets_unparsed: u64,
    /// Packets rejected by the user-space filter.
    pub packets_filtered: u64,
    pub payload_bytes: u64,
    pub messages_decoded: u64,
    pub reassembly: ReassemblyStats,
}

impl PipelineStats {
    pub fn frames_decoded(&self) -> u64 {
        self.reassembly.frames_emitted
    }

    pub fn frames_discarded(&self) -> u64 {
        self.reassembly.frames_discarded
    }
}

/// Parses packets, reassembles frames and routes decoded messages to a sink.
pub struct Pipeline {
    reassembler: Reassembler,
    router: MessageRouter,
    filter: Option<CaptureFilter>,
    sink: MessageSink,
    stats: PipelineStats,
}

impl Pipeline {
    pub fn new(config: ReassemblyConfig, sink: MessageSink) -> Self {
        let router = MessageRouter::new(config.limits.commands.clone());
        Self {
            reassembler: Reassembler::new(config),
            router,
            filter: None,
            sink,
            stats: PipelineStats::default(),
        }
    }

    /// Applies `filter` to every packet (unfiltered capture fallback).
    pub fn with_filter(mut self, filter: CaptureFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn commands(&self) -> &CommandSet {
        &self.reassembler.config().limits.commands
    }

    pub fn router_mut(&mut self) -> &mut MessageRouter {
        &mut self.router
    }

    /// A copy of the current counters.
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            reassembly: self.reassembler.stats().clone(),
            ..self.stats.clone()
        }
    }

    /// Drops all partially reassembled frames.
    pub fn reset(&mut self) {
        let dropped = self.reassembler.clear();
        debug!(streams = dropped, "pipeline reset");
    }

    pub fn handle_packet(&mut self, packet: &RawPacket) {
        self.stats.packets_seen += 1;
        let Some(segment) = parse_packet(packet) else {
            self.stats.packets_unparsed += 1;
            return;
        };
        if let Some(filter) = &self.filter {
            if !filter.matches(&segment) {
                self.stats.packets_filtered += 1;
                return;
            }
        }

        if !segment.payload.is_empty() {
            self.stats.payload_bytes += segment.payload.len() as u64;
            self.handle_payload(segment.key, &segment.payload);
        }
        if segment.flags.closes_stream() {
            let dropped = self.reassembler.close_stream(&segment.key);
            debug!(stream = %segment.key, dropped, "stream closed");
        }
    }

    /// Feeds payload bytes of one stream.
    pub fn handle_payload(&mut self, key: StreamKey, payload: &[u8]) {
        for event in self.reassembler.feed(key, payload) {
            match event {
                DecodeEvent::Frame(frame) => {
                    debug!(
                        stream = %key,
                        command = frame.command_code,
                        len = frame.total_length(),
                        "frame"
                    );
                    if let Some(message) = self.router.dispatch(&frame) {
                        self.stats.messages_decoded += 1;
                        (self.sink)(message);
                    }
                }
                DecodeEvent::Discarded { key, error } => {
                    warn!(stream = %key, reason = error.kind(), "discarded frame: {}", error);
                }
            }
        }
    }
}
