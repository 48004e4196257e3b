//! Link-layer parsing down to TCP payload.
//!
//! Only unfragmented IPv4/TCP is of interest; anything else parses to `None`.

use bytes::Bytes;
use stashsort_protocol::StreamKey;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_VLAN: u16 = 0x8100;
const ETHERTYPE_QINQ: u16 = 0x88a8;
const IPPROTO_TCP: u8 = 6;
const AF_INET: u32 = 2;

/// Link-layer header type of captured packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Ethernet,
    /// Linux "cooked" capture (the `any` pseudo-interface).
    LinuxSll,
    /// BSD loopback: 4-byte address family.
    Null,
    /// Bare IP packets.
    RawIp,
}

impl LinkType {
    /// Maps a libpcap DLT value.
    pub fn from_dlt(dlt: i32) -> Option<Self> {
        match dlt {
            0 => Some(LinkType::Null),
            1 => Some(LinkType::Ethernet),
            12 | 14 | 101 => Some(LinkType::RawIp),
            113 => Some(LinkType::LinuxSll),
            _ => None,
        }
    }
}

/// One captured link-layer packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub link: LinkType,
    pub data: Vec<u8>,
}

impl RawPacket {
    pub fn new(link: LinkType, data: Vec<u8>) -> Self {
        Self { link, data }
    }
}

/// TCP header flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcpFlags(pub u8);

impl TcpFlags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;

    pub fn is_fin(self) -> bool {
        self.0 & Self::FIN != 0
    }

    pub fn is_rst(self) -> bool {
        self.0 & Self::RST != 0
    }

    /// FIN or RST: the stream is over.
    pub fn closes_stream(self) -> bool {
        self.is_fin() || self.is_rst()
    }
}

/// A TCP segment with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpSegment {
    pub key: StreamKey,
    pub seq: u32,
    pub flags: TcpFlags,
    pub payload: Bytes,
}

impl fmt::Display for TcpSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} seq={} flags={:#04x} len={}",
            self.key,
            self.seq,
            self.flags.0,
            self.payload.len()
        )
    }
}

fn be16(data: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_be_bytes([*data.get(at)?, *data.get(at + 1)?]))
}

fn be32(data: &[u8], at: usize) -> Option<u32> {
    let b = data.get(at..at + 4)?;
    Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

/// Parses a captured packet into a TCP segment.
pub fn parse_packet(packet: &RawPacket) -> Option<TcpSegment> {
    let ip = match packet.link {
        LinkType::Ethernet => {
            let mut ethertype = be16(&packet.data, 12)?;
            let mut offset = 14;
            while ethertype == ETHERTYPE_VLAN || ethertype == ETHERTYPE_QINQ {
                ethertype = be16(&packet.data, offset + 2)?;
                offset += 4;
            }
            if ethertype != ETHERTYPE_IPV4 {
                return None;
            }
            packet.data.get(offset..)?
        }
        LinkType::LinuxSll => {
            if be16(&packet.data, 14)? != ETHERTYPE_IPV4 {
                return None;
            }
            packet.data.get(16..)?
        }
        LinkType::Null => {
            let family = packet.data.get(0..4)?;
            let family = [family[0], family[1], family[2], family[3]];
            if u32::from_le_bytes(family) != AF_INET && u32::from_be_bytes(family) != AF_INET {
                return None;
            }
            packet.data.get(4..)?
        }
        LinkType::RawIp => &packet.data[..],
    };
    parse_ipv4(ip)
}

/// Parses an IPv4 packet carrying TCP.
pub fn parse_ipv4(ip: &[u8]) -> Option<TcpSegment> {
    let first = *ip.first()?;
    if first >> 4 != 4 {
        return None;
    }
    let ihl = ((first & 0x0f) as usize) * 4;
    let total_len = be16(ip, 2)? as usize;
    if ihl < 20 || total_len < ihl || ip.len() < ihl {
        return None;
    }
    // Reassembling IP fragments is out of reach; skip them.
    let frag = be16(ip, 6)?;
    if frag & 0x2000 != 0 || frag & 0x1fff != 0 {
        return None;
    }
    if ip[9] != IPPROTO_TCP {
        return None;
    }
    let src_ip = Ipv4Addr::new(ip[12], ip[13], ip[14], ip[15]);
    let dst_ip = Ipv4Addr::new(ip[16], ip[17], ip[18], ip[19]);

    // Link layers may pad short frames; trust the IP length.
    let end = total_len.min(ip.len());
    let tcp = &ip[ihl..end];
    let src_port = be16(tcp, 0)?;
    let dst_port = be16(tcp, 2)?;
    let seq = be32(tcp, 4)?;
    let data_offset = ((*tcp.get(12)? >> 4) as usize) * 4;
    let flags = TcpFlags(*tcp.get(13)?);
    if data_offset < 20 || tcp.len() < data_offset {
        return None;
    }

    Some(TcpSegment {
        key: StreamKey::new(
            SocketAddrV4::new(src_ip, src_port),
            SocketAddrV4::new(dst_ip, dst_port),
        ),
        seq,
        flags,
        payload: Bytes::copy_from_slice(&tcp[data_offset..]),
    })
}

/// Builds an Ethernet/IPv4/TCP packet. Used to script captures.
pub fn build_ethernet_tcp(key: &StreamKey, seq: u32, flags: u8, payload: &[u8]) -> RawPacket {
    let total_len = (20 + 20 + payload.len()) as u16;
    let mut data = Vec::with_capacity(14 + total_len as usize);

    data.extend_from_slice(&[0x02, 0, 0, 0, 0, 0x01]);
    data.extend_from_slice(&[0x02, 0, 0, 0, 0, 0x02]);
    data.extend_from_slice(&ETHERTYPE_IPV4.to_be_bytes());

    data.extend_from_slice(&[0x45, 0]);
    data.extend_from_slice(&total_len.to_be_bytes());
    data.extend_from_slice(&[0, 0, 0x40, 0, 64, IPPROTO_TCP, 0, 0]);
    data.extend_from_slice(&key.src.ip().octets());
    data.extend_from_slice(&key.dst.ip().octets());

    data.extend_from_slice(&key.src.port().to_be_bytes());
    data.extend_from_slice(&key.dst.port().to_be_bytes());
    data.extend_from_slice(&seq.to_be_bytes());
    data.extend_from_slice(&0u32.to_be_bytes());
    data.extend_from_slice(&[0x50, flags, 0xff, 0xff, 0, 0, 0, 0]);

    data.extend_from_slice(payload);
    RawPacket::new(LinkType::Ethernet, data)
}
