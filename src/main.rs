use clap::Parser;
use log::{error, info};
use tokio::sync::mpsc;

use flowstat::args::Cli;
use flowstat::output::OutputWriter;
use flowstat::pcap::read_pcap_file;

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    // Argument validation
    if cli.report_interval == 0 {
        panic!("The report interval needs to be at least 1 packet!");
    }

    info!("flowstat {} starting up", env!("CARGO_PKG_VERSION"));

    // Create output writer and channel for exporting flows
    let (sender, receiver) = mpsc::channel::<String>(1000);
    let output_writer = OutputWriter::new(
        cli.output.method,
        cli.feature_header,
        receiver,
        cli.output.export_path,
    );

    // Start the output writer in a separate task
    let output_writer_task = tokio::spawn(output_writer.run());

    if let Err(err) = read_pcap_file(&cli.path, sender, cli.report_interval).await {
        error!("Error: {:?}", err);
        std::process::exit(1);
    }

    // The capture loop dropped its sender; wait for the writer to flush.
    if let Err(err) = output_writer_task.await {
        error!("output writer task failed: {}", err);
        std::process::exit(1);
    }
}
