//! libpcap / Npcap backend.

use crate::backend::{CaptureBackend, PacketSource, SourceCloser};
use crate::error::CaptureError;
use crate::packet::{LinkType, RawPacket};
use pcap::{Active, BreakLoop, Capture, Device};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

/// Live capture through libpcap.
#[derive(Debug, Clone)]
pub struct PcapBackend {
    pub snaplen: i32,
    pub read_timeout: Duration,
    pub promisc: bool,
}

impl Default for PcapBackend {
    fn default() -> Self {
        Self {
            snaplen: 65535,
            read_timeout: Duration::from_millis(100),
            promisc: false,
        }
    }
}

impl PcapBackend {
    pub fn new(snaplen: i32, read_timeout: Duration) -> Self {
        Self {
            snaplen,
            read_timeout,
            ..Self::default()
        }
    }

    fn find_device(interface: &str) -> Result<Device, CaptureError> {
        Device::list()
            .map_err(map_error)?
            .into_iter()
            .find(|d| d.name == interface || d.desc.as_deref() == Some(interface))
            .ok_or_else(|| CaptureError::InterfaceNotFound(interface.to_string()))
    }
}

impl CaptureBackend for PcapBackend {
    fn name(&self) -> &'static str {
        "pcap"
    }

    fn local_ipv4(&self, interface: &str) -> Result<Ipv4Addr, CaptureError> {
        Self::find_device(interface)?
            .addresses
            .iter()
            .find_map(|a| match a.addr {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .ok_or_else(|| CaptureError::NoIpv4Address(interface.to_string()))
    }

    fn open(
        &self,
        interface: &str,
        filter: Option<&str>,
    ) -> Result<Box<dyn PacketSource>, CaptureError> {
        let device = Self::find_device(interface)?;
        let mut capture = Capture::from_device(device)
            .map_err(map_error)?
            .snaplen(self.snaplen)
            .promisc(self.promisc)
            .immediate_mode(true)
            .timeout(self.read_timeout.as_millis().min(i32::MAX as u128) as i32)
            .open()
            .map_err(map_error)?;

        if let Some(expr) = filter {
            capture
                .filter(expr, true)
                .map_err(|e| CaptureError::InvalidFilter(format!("{}: {}", expr, e)))?;
        }

        let dlt = capture.get_datalink().0;
        let link = LinkType::from_dlt(dlt)
            .ok_or_else(|| CaptureError::Backend(format!("unsupported link type {}", dlt)))?;
        tracing::info!(
            "Opened {} (link {:?}, filter {})",
            interface,
            link,
            filter.unwrap_or("none")
        );
        let breaker = Arc::new(capture.breakloop_handle());
        Ok(Box::new(PcapSource {
            capture,
            link,
            breaker,
        }))
    }
}

struct PcapSource {
    capture: Capture<Active>,
    link: LinkType,
    breaker: Arc<BreakLoop>,
}

impl PacketSource for PcapSource {
    fn next_packet(&mut self) -> Result<Option<RawPacket>, CaptureError> {
        match self.capture.next_packet() {
            Ok(packet) => Ok(Some(RawPacket::new(self.link, packet.data.to_vec()))),
            Err(pcap::Error::TimeoutExpired) => Ok(None),
            Err(e) => Err(map_error(e)),
        }
    }

    fn closer(&self) -> Option<SourceCloser> {
        let breaker = self.breaker.clone();
        Some(Arc::new(move || breaker.breakloop()))
    }
}

fn map_error(error: pcap::Error) -> CaptureError {
    let message = error.to_string();
    let lower = message.to_ascii_lowercase();
    if lower.contains("permission") || lower.contains("not permitted") || lower.contains("access") {
        CaptureError::PermissionDenied(message)
    } else {
        CaptureError::Backend(message)
    }
}
