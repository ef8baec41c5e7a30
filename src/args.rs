use clap::{Args, Parser};

#[derive(Debug, Parser)]
#[clap(author, version, about)]
pub struct Cli {
    /// The capture file to read packets from
    pub path: String,

    /// Number of packets between idle-flow sweeps and progress reports
    #[clap(short = 'r', long, default_value_t = 500_000)]
    pub report_interval: u64,

    /// Write a header row with the feature names before the first flow
    #[clap(short = 'H', long, action = clap::ArgAction::SetTrue)]
    pub feature_header: bool,

    /// Output method
    #[clap(flatten)]
    pub output: Output,
}

#[derive(Args, Debug, Clone)]
pub struct Output {
    /// Output method
    #[clap(value_enum, default_value = "print")]
    pub method: ExportMethodType,

    /// File path for output (used if method is csv)
    #[clap(required_if_eq("method", "csv"))]
    pub export_path: Option<String>,
}

#[derive(clap::ValueEnum, Clone, Debug)]
pub enum ExportMethodType {
    /// The output will be printed to the console
    Print,

    /// The output will be written to a CSV file
    Csv,
}
