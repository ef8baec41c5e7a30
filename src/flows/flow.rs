use std::net::Ipv4Addr;

use log::warn;

use crate::error::FlowError;
use crate::packet_features::{has_flag, PacketFeatures, IP_TCP, IP_UDP, PSH_FLAG, URG_FLAG};

use super::features::{FeatureId::*, FeatureVec};
use super::tcp_state::{Direction, TcpState};

/// Gap after which a flow is considered dead and its key reusable, in µs.
pub const FLOW_TIMEOUT: i64 = 600_000_000;
/// Gap after which a new sub-flow (active period) begins, in µs.
pub const IDLE_THRESHOLD: i64 = 1_000_000;

/// Outcome of feeding one packet to a flow.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UpdateResult {
    /// Packet accounted for, flow stays in the table.
    Success,
    /// TCP teardown complete, export and remove.
    Closed,
    /// Packet arrived after the flow timeout; the flow was left
    /// untouched and should be exported and replaced.
    Idle,
}

/// One bidirectional conversation and its statistics accumulators.
///
/// The forward direction is defined by the first packet seen; the
/// identity fields keep that packet's src/dst orientation even though
/// the table key is canonicalized.
#[derive(Clone, Debug)]
pub struct Flow {
    pub(crate) features: FeatureVec,

    pub(crate) valid: bool,
    pub(crate) active_start_us: i64,
    first_timestamp_us: i64,
    pub(crate) last_fwd_us: i64,
    pub(crate) last_bwd_us: i64,
    client_state: TcpState,
    server_state: TcpState,
    has_data: bool,
    is_bidir: bool,
    pdir: Direction,

    pub ip_source: Ipv4Addr,
    pub port_source: u16,
    pub ip_destination: Ipv4Addr,
    pub port_destination: u16,
    pub protocol: u8,
    dscp: u8,
}

impl Flow {
    /// Creates a flow from its first packet, which also defines the
    /// forward direction and is accounted for here; the caller must not
    /// feed the same packet through `update`.
    pub fn new(packet: &PacketFeatures) -> Self {
        let mut features = FeatureVec::new();
        features[TotalFpackets].set(1);
        features[TotalFvolume].set(packet.length);
        features[Fpktl].add(packet.length);
        features[TotalFhlen].set(packet.ip_header_length + packet.transport_header_length);
        if packet.protocol == IP_TCP {
            if has_flag(packet.flags, PSH_FLAG) {
                features[FpshCnt].set(1);
            }
            if has_flag(packet.flags, URG_FLAG) {
                features[FurgCnt].set(1);
            }
        }

        let mut flow = Flow {
            features,
            valid: false,
            active_start_us: packet.timestamp_us,
            first_timestamp_us: packet.timestamp_us,
            last_fwd_us: packet.timestamp_us,
            last_bwd_us: 0,
            client_state: TcpState::Start,
            server_state: TcpState::Start,
            has_data: false,
            is_bidir: false,
            pdir: Direction::Forward,
            ip_source: packet.source_ip,
            port_source: packet.source_port,
            ip_destination: packet.destination_ip,
            port_destination: packet.destination_port,
            protocol: packet.protocol,
            dscp: packet.dscp,
        };
        flow.update_status(packet);
        flow
    }

    /// Timestamp of the flow's most recent activity. Either side's last
    /// time may be 0, because no packet has been seen in that direction
    /// or because a sub-flow reset cleared both; the non-zero value (or
    /// the max) is the correct answer in every case.
    fn last_seen_us(&self) -> i64 {
        if self.last_bwd_us == 0 {
            return self.last_fwd_us;
        }
        if self.last_fwd_us == 0 {
            return self.last_bwd_us;
        }
        self.last_fwd_us.max(self.last_bwd_us)
    }

    pub fn first_timestamp_us(&self) -> i64 {
        self.first_timestamp_us
    }

    /// Accounts one packet to the flow.
    pub fn update(&mut self, packet: &PacketFeatures) -> Result<UpdateResult, FlowError> {
        let now = packet.timestamp_us;
        let last = self.last_seen_us();
        let mut diff = now - last;
        if diff > FLOW_TIMEOUT {
            return Ok(UpdateResult::Idle);
        }
        if now < last {
            warn!("ignoring reordered packet: {} < {}", now, last);
            return Ok(UpdateResult::Success);
        }
        if now < self.first_timestamp_us {
            return Err(FlowError::PacketBeforeFlowStart {
                packet_us: now,
                flow_us: self.first_timestamp_us,
            });
        }
        let length = packet.length;
        let hlen = packet.ip_header_length + packet.transport_header_length;

        self.pdir = if packet.source_ip == self.ip_source {
            Direction::Forward
        } else {
            Direction::Backward
        };

        if diff > IDLE_THRESHOLD {
            // This packet starts a new sub-flow: the gap is an idle
            // sample, and the burst that ended at `last` an active one.
            self.features[Idle].add(diff);
            diff = last - self.active_start_us;
            self.features[Active].add(diff);

            self.last_fwd_us = 0;
            self.last_bwd_us = 0;
            self.active_start_us = now;
        }

        if self.pdir == Direction::Forward {
            if self.dscp == 0 {
                self.dscp = packet.dscp;
            }
            self.features[Fpktl].add(length);
            self.features[TotalFvolume].add(length);
            self.features[TotalFpackets].add(1);
            self.features[TotalFhlen].add(hlen);
            if self.last_fwd_us > 0 {
                self.features[Fiat].add(now - self.last_fwd_us);
            }
            if self.protocol == IP_TCP {
                if has_flag(packet.flags, PSH_FLAG) {
                    self.features[FpshCnt].add(1);
                }
                if has_flag(packet.flags, URG_FLAG) {
                    self.features[FurgCnt].add(1);
                }
            }
            self.last_fwd_us = now;
        } else {
            self.is_bidir = true;
            if self.dscp == 0 {
                self.dscp = packet.dscp;
            }
            self.features[Bpktl].add(length);
            self.features[TotalBvolume].add(length);
            self.features[TotalBpackets].add(1);
            self.features[TotalBhlen].add(hlen);
            if self.last_bwd_us > 0 {
                self.features[Biat].add(now - self.last_bwd_us);
            }
            if self.protocol == IP_TCP {
                if has_flag(packet.flags, PSH_FLAG) {
                    self.features[BpshCnt].add(1);
                }
                if has_flag(packet.flags, URG_FLAG) {
                    self.features[BurgCnt].add(1);
                }
            }
            self.last_bwd_us = now;
        }

        self.update_status(packet);

        if self.protocol == IP_TCP
            && self.client_state == TcpState::Closed
            && self.server_state == TcpState::Closed
        {
            return Ok(UpdateResult::Closed);
        }
        Ok(UpdateResult::Success)
    }

    fn update_tcp_state(&mut self, packet: &PacketFeatures) {
        self.client_state
            .update(packet.flags, Direction::Forward, self.pdir);
        self.server_state
            .update(packet.flags, Direction::Backward, self.pdir);
    }

    /// Refreshes the validity gate and, for TCP, both state trackers.
    ///
    /// A UDP flow becomes valid once it has carried data in both
    /// directions. A TCP flow becomes valid once a data-carrying packet
    /// arrives while the client tracker is ESTABLISHED; the check runs
    /// before the trackers see the current packet.
    fn update_status(&mut self, packet: &PacketFeatures) {
        if self.protocol == IP_UDP {
            if self.valid {
                return;
            }
            if packet.length > 8 {
                self.has_data = true;
            }
            if self.has_data && self.is_bidir {
                self.valid = true;
            }
        } else if self.protocol == IP_TCP {
            if !self.valid
                && self.client_state == TcpState::Established
                && packet.length > packet.ip_header_length + packet.transport_header_length
            {
                self.valid = true;
            }
            self.update_tcp_state(packet);
        }
    }

    /// True once the gap since the last activity exceeds the flow timeout.
    pub fn check_idle(&self, now_us: i64) -> bool {
        (now_us - self.last_seen_us()) > FLOW_TIMEOUT
    }

    /// Finalizes the flow and renders its CSV row.
    ///
    /// Returns `None` for flows that never met the validity gate; those
    /// are dropped silently. Finalization closes the running sub-flow,
    /// derives the per-sub-flow rates and the duration, so this must be
    /// called at most once.
    pub fn export(&mut self) -> Result<Option<String>, FlowError> {
        if !self.valid {
            return Ok(None);
        }

        // Close the sub-flow that was still running at termination.
        let diff = self.last_seen_us() - self.active_start_us;
        self.features[Active].add(diff);

        let active_count = self.features[Active].get();
        if active_count > 0 {
            let fpackets = self.features[TotalFpackets].get();
            let fbytes = self.features[TotalFvolume].get();
            let bpackets = self.features[TotalBpackets].get();
            let bbytes = self.features[TotalBvolume].get();
            self.features[SflowFpackets].set(fpackets / active_count);
            self.features[SflowFbytes].set(fbytes / active_count);
            self.features[SflowBpackets].set(bpackets / active_count);
            self.features[SflowBbytes].set(bbytes / active_count);
        }

        let duration = self.last_seen_us() - self.first_timestamp_us;
        if duration < 0 {
            return Err(FlowError::NegativeDuration(duration));
        }
        self.features[Duration].set(duration);

        if self.features[TotalFpackets].get() <= 0 {
            return Err(FlowError::NoForwardPackets);
        }

        Ok(Some(self.dump()))
    }

    fn dump(&self) -> String {
        let mut row = format!(
            "{},{},{},{},{}",
            self.ip_source,
            self.port_source,
            self.ip_destination,
            self.port_destination,
            self.protocol
        );
        for feature in self.features.iter() {
            row.push(',');
            row.push_str(&feature.export());
        }
        row.push(',');
        row.push_str(&self.dscp.to_string());
        row
    }

    /// Header row matching `dump`'s column order.
    pub fn csv_header() -> String {
        [
            "srcip",
            "srcport",
            "dstip",
            "dstport",
            "proto",
            "total_fpackets",
            "total_fvolume",
            "total_bpackets",
            "total_bvolume",
            "min_fpktl",
            "mean_fpktl",
            "max_fpktl",
            "std_fpktl",
            "min_bpktl",
            "mean_bpktl",
            "max_bpktl",
            "std_bpktl",
            "min_fiat",
            "mean_fiat",
            "max_fiat",
            "std_fiat",
            "min_biat",
            "mean_biat",
            "max_biat",
            "std_biat",
            "duration",
            "min_active",
            "mean_active",
            "max_active",
            "std_active",
            "min_idle",
            "mean_idle",
            "max_idle",
            "std_idle",
            "sflow_fpackets",
            "sflow_fbytes",
            "sflow_bpackets",
            "sflow_bbytes",
            "fpsh_cnt",
            "bpsh_cnt",
            "furg_cnt",
            "burg_cnt",
            "total_fhlen",
            "total_bhlen",
            "dscp",
        ]
        .join(",")
    }
}
