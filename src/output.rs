use std::{
    fs::File,
    io::{BufWriter, Write},
};

use log::{debug, error};
use tokio::sync::mpsc::Receiver;

use crate::args::ExportMethodType;
use crate::flows::flow::Flow;

/// Receives finished CSV rows and writes them to stdout or a file.
pub struct OutputWriter {
    export_type: ExportMethodType,
    write_header: bool,
    receiver: Receiver<String>,
    file_path: Option<String>,
}

impl OutputWriter {
    pub fn new(
        export_type: ExportMethodType,
        write_header: bool,
        receiver: Receiver<String>,
        file_path: Option<String>,
    ) -> Self {
        OutputWriter {
            export_type,
            write_header,
            receiver,
            file_path,
        }
    }

    pub async fn run(mut self) {
        match self.export_type {
            ExportMethodType::Csv => {
                let path = self.file_path.clone().expect("no path for CSV output");
                let file = File::create(&path).expect("failed to create output file");
                let mut writer = BufWriter::new(file);

                if self.write_header {
                    if let Err(e) = writeln!(writer, "{}", Flow::csv_header()) {
                        error!("error writing header to file: {}", e);
                    }
                }

                while let Some(row) = self.receiver.recv().await {
                    if let Err(e) = writeln!(writer, "{}", row) {
                        error!("error writing to file: {}", e);
                    }
                }

                debug!("output writer finishing up");

                if let Err(e) = writer.flush() {
                    error!("error flushing writer: {}", e);
                }
            }
            ExportMethodType::Print => {
                let mut stdout = std::io::stdout();

                if self.write_header {
                    if let Err(e) = writeln!(stdout, "{}", Flow::csv_header()) {
                        error!("error writing header to stdout: {}", e);
                    }
                }

                while let Some(row) = self.receiver.recv().await {
                    if let Err(e) = writeln!(stdout, "{}", row) {
                        error!("error writing to stdout: {}", e);
                    }
                }
            }
        }
    }
}
