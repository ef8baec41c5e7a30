use std::panic::AssertUnwindSafe;
use std::time::Instant;

use chrono::DateTime;
use futures::FutureExt;
use log::{debug, error, info, warn};
use pnet::packet::{
    ethernet::{EtherTypes, EthernetPacket},
    ipv4::Ipv4Packet,
    Packet,
};
use tokio::sync::mpsc::Sender;

use crate::error::FlowError;
use crate::flow_table::FlowTable;
use crate::packet_features::PacketFeatures;

/// Reads an offline capture and runs every packet through the flow
/// table, sweeping idle flows and reporting progress every
/// `report_interval` packets. Remaining flows are drained at end of
/// input.
pub async fn read_pcap_file(
    path: &str,
    output_channel: Sender<String>,
    report_interval: u64,
) -> Result<(), anyhow::Error> {
    debug!("Opening the pcap file: {:?} ...", path);

    let mut capture = match pcap::Capture::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            error!("Error opening file: {:?}", e);
            return Err(anyhow::Error::new(e));
        }
    };
    capture.filter("ip and (tcp or udp)", true)?;

    let mut flow_table = FlowTable::new(output_channel);
    let mut packet_count: u64 = 0;
    let mut interval_start = Instant::now();

    debug!("Reading the pcap file: {:?} ...", path);
    while let Ok(packet) = capture.next_packet() {
        packet_count += 1;
        let timestamp_us =
            packet.header.ts.tv_sec as i64 * 1_000_000 + packet.header.ts.tv_usec as i64;

        // One recovery boundary per packet: a decode panic costs only
        // the packet carrying it. Invariant violations pass through as
        // errors and abort the run.
        match AssertUnwindSafe(dispatch_packet(&mut flow_table, packet.data, timestamp_us))
            .catch_unwind()
            .await
        {
            Ok(result) => result?,
            Err(_) => error!("panic while processing packet {}, skipping", packet_count),
        }

        if packet_count % report_interval == 0 {
            let removed = flow_table.sweep(timestamp_us).await?;
            let capture_clock = DateTime::from_timestamp_micros(timestamp_us)
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| timestamp_us.to_string());
            info!(
                "Currently processing packet {}. Flow table size: {} ({} swept at {})",
                packet_count,
                flow_table.len(),
                removed,
                capture_clock
            );
            info!(
                "Took {:?} to process the last {} packets",
                interval_start.elapsed(),
                report_interval
            );
            interval_start = Instant::now();
        }
    }
    debug!("Finished reading the pcap file: {:?}", path);

    flow_table.drain().await?;
    Ok(())
}

/// Decodes one link-layer frame down to a `PacketFeatures` bundle and
/// hands it to the flow table.
async fn dispatch_packet(
    flow_table: &mut FlowTable,
    data: &[u8],
    timestamp_us: i64,
) -> Result<(), FlowError> {
    let Some(ethernet) = EthernetPacket::new(data) else {
        warn!("skipping truncated ethernet frame");
        return Ok(());
    };
    match ethernet.get_ethertype() {
        EtherTypes::Ipv4 => {
            let Some(ipv4) = Ipv4Packet::new(ethernet.payload()) else {
                warn!("skipping truncated IPv4 packet");
                return Ok(());
            };
            match PacketFeatures::from_ipv4_packet(&ipv4, timestamp_us) {
                Ok(features) => flow_table.process_packet(&features).await,
                Err(FlowError::TruncatedHeader(what)) => {
                    warn!("skipping packet with truncated {} header", what);
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
        other => Err(FlowError::NotIpv4(other.0)),
    }
}
