use std::net::Ipv4Addr;

use pnet::packet::{
    ip::IpNextHeaderProtocols,
    ipv4::Ipv4Packet,
    tcp::TcpPacket,
    udp::UdpPacket,
    Packet,
};

use crate::error::FlowError;

// TCP flag bits
pub const FIN_FLAG: u8 = 0b0000_0001;
pub const SYN_FLAG: u8 = 0b0000_0010;
pub const RST_FLAG: u8 = 0b0000_0100;
pub const PSH_FLAG: u8 = 0b0000_1000;
pub const ACK_FLAG: u8 = 0b0001_0000;
pub const URG_FLAG: u8 = 0b0010_0000;

// IP protocol numbers
pub const IP_TCP: u8 = 6;
pub const IP_UDP: u8 = 17;

pub fn has_flag(flags: u8, flag: u8) -> bool {
    flags & flag == flag
}

/// The per-packet field bundle handed to the flow engine.
///
/// Lengths are carried as i64 so they feed the integer accumulators
/// without casts. For UDP, `transport_header_length` holds the UDP
/// length field (header plus payload), matching the exported
/// total_fhlen/total_bhlen semantics for UDP flows.
#[derive(Clone, Debug)]
pub struct PacketFeatures {
    pub source_ip: Ipv4Addr,
    pub destination_ip: Ipv4Addr,
    pub source_port: u16,
    pub destination_port: u16,
    pub protocol: u8,
    pub timestamp_us: i64,
    pub length: i64,
    pub ip_header_length: i64,
    pub transport_header_length: i64,
    pub dscp: u8,
    pub flags: u8,
}

impl PacketFeatures {
    /// Extracts the field bundle from a decoded IPv4 packet.
    ///
    /// Only TCP and UDP are accepted; anything else should have been
    /// dropped by the capture filter and is reported as an invariant
    /// violation.
    pub fn from_ipv4_packet(packet: &Ipv4Packet, timestamp_us: i64) -> Result<Self, FlowError> {
        let source_ip = packet.get_source();
        let destination_ip = packet.get_destination();
        let length = packet.get_total_length() as i64;
        let ip_header_length = packet.get_header_length() as i64 * 4;
        let dscp = packet.get_dscp();

        match packet.get_next_level_protocol() {
            IpNextHeaderProtocols::Tcp => {
                let tcp = TcpPacket::new(packet.payload())
                    .ok_or(FlowError::TruncatedHeader("tcp"))?;
                Ok(PacketFeatures {
                    source_ip,
                    destination_ip,
                    source_port: tcp.get_source(),
                    destination_port: tcp.get_destination(),
                    protocol: IP_TCP,
                    timestamp_us,
                    length,
                    ip_header_length,
                    transport_header_length: tcp.get_data_offset() as i64 * 4,
                    dscp,
                    flags: tcp.get_flags(),
                })
            }
            IpNextHeaderProtocols::Udp => {
                let udp = UdpPacket::new(packet.payload())
                    .ok_or(FlowError::TruncatedHeader("udp"))?;
                Ok(PacketFeatures {
                    source_ip,
                    destination_ip,
                    source_port: udp.get_source(),
                    destination_port: udp.get_destination(),
                    protocol: IP_UDP,
                    timestamp_us,
                    length,
                    ip_header_length,
                    transport_header_length: udp.get_length() as i64,
                    dscp,
                    flags: 0,
                })
            }
            other => Err(FlowError::UnsupportedTransport(other.0)),
        }
    }

    /// Canonical bidirectional key: both directions of a conversation
    /// map to the same string. Endpoints are ordered by comparing
    /// (ip-as-string, port), greater endpoint first.
    pub fn biflow_key(&self) -> String {
        let src = (self.source_ip.to_string(), self.source_port);
        let dst = (self.destination_ip.to_string(), self.destination_port);
        if src > dst {
            format!(
                "{},{},{},{},{}",
                src.0, src.1, dst.0, dst.1, self.protocol
            )
        } else {
            format!(
                "{},{},{},{},{}",
                dst.0, dst.1, src.0, src.1, self.protocol
            )
        }
    }
}
