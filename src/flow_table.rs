use std::collections::HashMap;

use log::{debug, error};
use tokio::sync::mpsc;

use crate::error::FlowError;
use crate::flows::flow::{Flow, UpdateResult};
use crate::packet_features::PacketFeatures;

/// The table of in-progress flows, keyed by canonical 5-tuple.
///
/// Owned by a single task; finished rows leave through the export
/// channel towards the output writer.
pub struct FlowTable {
    flows: HashMap<String, Flow>,
    export_channel: mpsc::Sender<String>,
}

impl FlowTable {
    pub fn new(export_channel: mpsc::Sender<String>) -> Self {
        Self {
            flows: HashMap::new(),
            export_channel,
        }
    }

    /// Dispatches one packet: updates the matching flow or creates one.
    ///
    /// A flow reporting `Closed` is exported and removed; one reporting
    /// `Idle` is exported and replaced by a fresh flow seeded from the
    /// current packet, under the same key.
    pub async fn process_packet(&mut self, packet: &PacketFeatures) -> Result<(), FlowError> {
        let key = packet.biflow_key();
        if let Some(mut flow) = self.flows.remove(&key) {
            match flow.update(packet)? {
                UpdateResult::Success => {
                    self.flows.insert(key, flow);
                }
                UpdateResult::Closed => {
                    debug!("flow closed by TCP teardown: {}", key);
                    self.export_flow(flow).await?;
                }
                UpdateResult::Idle => {
                    debug!("flow timed out, replacing: {}", key);
                    self.export_flow(flow).await?;
                    self.flows.insert(key, Flow::new(packet));
                }
            }
        } else {
            self.flows.insert(key, Flow::new(packet));
        }
        Ok(())
    }

    /// Evicts and exports every flow idle past the flow timeout.
    /// Returns the number of flows removed.
    pub async fn sweep(&mut self, now_us: i64) -> Result<usize, FlowError> {
        let expired: Vec<String> = self
            .flows
            .iter()
            .filter(|(_, flow)| flow.check_idle(now_us))
            .map(|(key, _)| key.clone())
            .collect();

        let count = expired.len();
        for key in expired {
            if let Some(flow) = self.flows.remove(&key) {
                self.export_flow(flow).await?;
            }
        }
        Ok(count)
    }

    /// Exports every remaining flow at end of input, in order of first
    /// packet arrival.
    pub async fn drain(&mut self) -> Result<(), FlowError> {
        let mut remaining: Vec<Flow> = self.flows.drain().map(|(_, flow)| flow).collect();
        remaining.sort_by_key(|flow| flow.first_timestamp_us());

        for flow in remaining {
            self.export_flow(flow).await?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    async fn export_flow(&self, mut flow: Flow) -> Result<(), FlowError> {
        if let Some(row) = flow.export()? {
            if let Err(e) = self.export_channel.send(row).await {
                error!("failed to send flow record: {}", e);
            }
        }
        Ok(())
    }
}
