use thiserror::Error;

/// Errors raised by the flow engine.
///
/// Everything except `TruncatedHeader` is an invariant violation: the
/// driver treats those as fatal and exits nonzero. A truncated transport
/// header only costs the one packet carrying it.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("packet is not IPv4 (ethertype {0:#06x}), the capture filter should have dropped it")]
    NotIpv4(u16),

    #[error("unsupported transport protocol {0}, the capture filter should have dropped it")]
    UnsupportedTransport(u8),

    #[error("truncated {0} header")]
    TruncatedHeader(&'static str),

    #[error("packet at {packet_us}us predates flow start at {flow_us}us")]
    PacketBeforeFlowStart { packet_us: i64, flow_us: i64 },

    #[error("flow exported with negative duration {0}")]
    NegativeDuration(i64),

    #[error("flow exported with no forward packets")]
    NoForwardPackets,
}
