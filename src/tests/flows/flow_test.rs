#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use crate::error::FlowError;
    use crate::flows::features::FeatureId;
    use crate::flows::flow::{Flow, UpdateResult, FLOW_TIMEOUT};
    use crate::packet_features::{
        PacketFeatures, ACK_FLAG, FIN_FLAG, IP_TCP, IP_UDP, PSH_FLAG, SYN_FLAG,
    };

    const CLIENT: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);
    const SERVER: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 2);

    fn udp_packet(
        timestamp_us: i64,
        source_ip: Ipv4Addr,
        destination_ip: Ipv4Addr,
        length: i64,
    ) -> PacketFeatures {
        let (source_port, destination_port) = if source_ip == CLIENT {
            (5000, 53)
        } else {
            (53, 5000)
        };
        PacketFeatures {
            source_ip,
            destination_ip,
            source_port,
            destination_port,
            protocol: IP_UDP,
            timestamp_us,
            length,
            ip_header_length: 20,
            transport_header_length: length - 20,
            dscp: 0,
            flags: 0,
        }
    }

    fn tcp_packet(
        timestamp_us: i64,
        source_ip: Ipv4Addr,
        destination_ip: Ipv4Addr,
        length: i64,
        flags: u8,
    ) -> PacketFeatures {
        let (source_port, destination_port) = if source_ip == CLIENT {
            (40000, 80)
        } else {
            (80, 40000)
        };
        PacketFeatures {
            source_ip,
            destination_ip,
            source_port,
            destination_port,
            protocol: IP_TCP,
            timestamp_us,
            length,
            ip_header_length: 20,
            transport_header_length: 20,
            dscp: 0,
            flags,
        }
    }

    #[test]
    fn test_first_packet_defines_forward_direction() {
        let flow = Flow::new(&udp_packet(1_000_000, CLIENT, SERVER, 100));

        assert_eq!(flow.ip_source, CLIENT);
        assert_eq!(flow.port_source, 5000);
        assert_eq!(flow.ip_destination, SERVER);
        assert_eq!(flow.port_destination, 53);
        assert_eq!(flow.protocol, IP_UDP);
        assert_eq!(flow.features[FeatureId::TotalFpackets].get(), 1);
        assert_eq!(flow.features[FeatureId::TotalFvolume].get(), 100);
        assert_eq!(flow.features[FeatureId::TotalFhlen].get(), 100);
    }

    #[test]
    fn test_unidirectional_udp_is_never_exported() {
        let mut flow = Flow::new(&udp_packet(1_000_000, CLIENT, SERVER, 200));
        flow.update(&udp_packet(1_000_300, CLIENT, SERVER, 200))
            .unwrap();

        assert!(!flow.valid);
        assert!(flow.export().unwrap().is_none());
    }

    #[test]
    fn test_bidirectional_udp_becomes_valid() {
        let mut flow = Flow::new(&udp_packet(1_000_000, CLIENT, SERVER, 100));
        assert!(!flow.valid);

        let result = flow
            .update(&udp_packet(1_000_500, SERVER, CLIENT, 100))
            .unwrap();

        assert_eq!(result, UpdateResult::Success);
        assert!(flow.valid);
        assert_eq!(flow.features[FeatureId::TotalFpackets].get(), 1);
        assert_eq!(flow.features[FeatureId::TotalBpackets].get(), 1);

        let row = flow.export().unwrap().expect("valid flow must export");
        let columns: Vec<&str> = row.split(',').collect();
        assert_eq!(columns.len(), 45);
        assert_eq!(columns[25], "500"); // duration
    }

    #[test]
    fn test_empty_udp_exchange_stays_invalid() {
        // Payloads of 8 bytes or less never set hasData.
        let mut flow = Flow::new(&udp_packet(1_000_000, CLIENT, SERVER, 8));
        flow.update(&udp_packet(1_000_500, SERVER, CLIENT, 8))
            .unwrap();

        assert!(!flow.valid);
        assert!(flow.export().unwrap().is_none());
    }

    #[test]
    fn test_tcp_handshake_data_teardown() {
        let mut flow = Flow::new(&tcp_packet(1_000_000, CLIENT, SERVER, 40, SYN_FLAG));

        let packets = [
            tcp_packet(1_000_100, SERVER, CLIENT, 40, SYN_FLAG | ACK_FLAG),
            tcp_packet(1_000_200, CLIENT, SERVER, 40, ACK_FLAG),
            tcp_packet(1_000_300, CLIENT, SERVER, 240, PSH_FLAG | ACK_FLAG),
            tcp_packet(1_000_400, CLIENT, SERVER, 40, FIN_FLAG | ACK_FLAG),
            tcp_packet(1_000_500, SERVER, CLIENT, 40, FIN_FLAG | ACK_FLAG),
        ];
        for packet in &packets {
            assert_eq!(flow.update(packet).unwrap(), UpdateResult::Success);
        }

        // The final ACK completes both half-closes.
        let result = flow
            .update(&tcp_packet(1_000_600, CLIENT, SERVER, 40, ACK_FLAG))
            .unwrap();
        assert_eq!(result, UpdateResult::Closed);

        assert!(flow.valid);
        assert_eq!(flow.features[FeatureId::TotalFpackets].get(), 5);
        assert_eq!(flow.features[FeatureId::TotalBpackets].get(), 2);
        assert_eq!(flow.features[FeatureId::FpshCnt].get(), 1);
        assert_eq!(flow.features[FeatureId::BpshCnt].get(), 0);
    }

    #[test]
    fn test_tcp_without_payload_is_never_valid() {
        let mut flow = Flow::new(&tcp_packet(1_000_000, CLIENT, SERVER, 40, SYN_FLAG));

        let packets = [
            tcp_packet(1_000_100, SERVER, CLIENT, 40, SYN_FLAG | ACK_FLAG),
            tcp_packet(1_000_200, CLIENT, SERVER, 40, ACK_FLAG),
            tcp_packet(1_000_300, CLIENT, SERVER, 40, FIN_FLAG | ACK_FLAG),
            tcp_packet(1_000_400, SERVER, CLIENT, 40, FIN_FLAG | ACK_FLAG),
        ];
        for packet in &packets {
            flow.update(packet).unwrap();
        }
        let result = flow
            .update(&tcp_packet(1_000_500, CLIENT, SERVER, 40, ACK_FLAG))
            .unwrap();

        assert_eq!(result, UpdateResult::Closed);
        assert!(!flow.valid);
        assert!(flow.export().unwrap().is_none());
    }

    #[test]
    fn test_idle_gap_starts_new_subflow() {
        let mut flow = Flow::new(&udp_packet(10_000_000, CLIENT, SERVER, 100));
        flow.update(&udp_packet(10_000_500, SERVER, CLIENT, 100))
            .unwrap();

        // 2s gap: one idle sample, one active sample, both last-seen
        // markers reset before the new packet is counted.
        flow.update(&udp_packet(12_000_500, CLIENT, SERVER, 100))
            .unwrap();

        assert_eq!(flow.features[FeatureId::Idle].get(), 1);
        assert_eq!(
            flow.features[FeatureId::Idle].export(),
            "2000000,2000000,2000000,0"
        );
        assert_eq!(flow.features[FeatureId::Active].get(), 1);
        assert_eq!(flow.features[FeatureId::Active].export(), "500,500,500,0");
        assert_eq!(flow.active_start_us, 12_000_500);
        assert_eq!(flow.last_fwd_us, 12_000_500);
        assert_eq!(flow.last_bwd_us, 0);
    }

    #[test]
    fn test_gap_beyond_flow_timeout_reports_idle_without_mutation() {
        let mut flow = Flow::new(&udp_packet(1_000_000, CLIENT, SERVER, 100));

        let late = udp_packet(1_000_000 + FLOW_TIMEOUT + 1, CLIENT, SERVER, 100);
        assert_eq!(flow.update(&late).unwrap(), UpdateResult::Idle);

        assert_eq!(flow.features[FeatureId::TotalFpackets].get(), 1);
        assert_eq!(flow.last_fwd_us, 1_000_000);
    }

    #[test]
    fn test_reordered_packet_is_ignored() {
        let mut flow = Flow::new(&udp_packet(2_000_000, CLIENT, SERVER, 100));
        flow.update(&udp_packet(2_000_100, SERVER, CLIENT, 100))
            .unwrap();

        let result = flow
            .update(&udp_packet(1_999_000, CLIENT, SERVER, 100))
            .unwrap();

        assert_eq!(result, UpdateResult::Success);
        assert_eq!(flow.features[FeatureId::TotalFpackets].get(), 1);
        assert_eq!(flow.features[FeatureId::TotalBpackets].get(), 1);
        assert_eq!(flow.last_fwd_us, 2_000_000);
    }

    #[test]
    fn test_packet_before_flow_start_is_fatal() {
        let mut flow = Flow::new(&udp_packet(5_000_000, CLIENT, SERVER, 100));

        // After a sub-flow reset both markers are zero, so an ancient
        // packet slips past the reorder check and must be refused.
        flow.last_fwd_us = 0;
        flow.last_bwd_us = 0;

        let result = flow.update(&udp_packet(4_000_000, CLIENT, SERVER, 100));
        assert!(matches!(
            result,
            Err(FlowError::PacketBeforeFlowStart { .. })
        ));
    }

    #[test]
    fn test_dscp_adopted_from_first_marked_packet() {
        let mut flow = Flow::new(&udp_packet(1_000_000, CLIENT, SERVER, 100));

        let mut marked = udp_packet(1_000_500, SERVER, CLIENT, 100);
        marked.dscp = 34;
        flow.update(&marked).unwrap();

        let mut marked_again = udp_packet(1_001_000, CLIENT, SERVER, 100);
        marked_again.dscp = 10;
        flow.update(&marked_again).unwrap();

        let row = flow.export().unwrap().expect("valid flow must export");
        assert_eq!(row.split(',').last().unwrap(), "34");
    }

    #[test]
    fn test_forward_iat_accumulates_between_forward_packets() {
        let mut flow = Flow::new(&udp_packet(1_000_000, CLIENT, SERVER, 100));
        flow.update(&udp_packet(1_000_200, CLIENT, SERVER, 100))
            .unwrap();
        flow.update(&udp_packet(1_000_600, CLIENT, SERVER, 100))
            .unwrap();

        assert_eq!(flow.features[FeatureId::Fiat].get(), 2);
        assert_eq!(flow.features[FeatureId::Fiat].export(), "200,300,400,141");
    }

    #[test]
    fn test_subflow_rates_divide_by_active_count() {
        let mut flow = Flow::new(&udp_packet(10_000_000, CLIENT, SERVER, 100));
        flow.update(&udp_packet(10_000_500, SERVER, CLIENT, 100))
            .unwrap();
        // Second sub-flow after a 2s gap.
        flow.update(&udp_packet(12_000_500, CLIENT, SERVER, 100))
            .unwrap();
        flow.update(&udp_packet(12_000_900, SERVER, CLIENT, 100))
            .unwrap();

        let row = flow.export().unwrap().expect("valid flow must export");
        let columns: Vec<&str> = row.split(',').collect();

        // Two active samples: sflow counters are per-sub-flow averages.
        assert_eq!(columns[34], "1"); // sflow_fpackets = 2/2
        assert_eq!(columns[35], "100"); // sflow_fbytes = 200/2
        assert_eq!(columns[36], "1"); // sflow_bpackets
        assert_eq!(columns[37], "100"); // sflow_bbytes
    }
}
