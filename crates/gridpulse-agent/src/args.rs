use clap::Parser;

/// Arguments of the agent CLI.
#[derive(Parser, Debug, Clone)]
#[command(version, about = "gridpulse smart-meter telemetry agent")]
pub struct Args {
    /// Number of measurements, -1 for infinite
    #[clap(
        short = 'c',
        long,
        value_name = "N",
        allow_negative_numbers = true,
        default_value_t = -1
    )]
    pub count: i64,

    /// Interval between two measurements in milliseconds
    #[clap(
        short = 'i',
        long,
        value_name = "MS",
        allow_negative_numbers = true,
        default_value_t = 1000
    )]
    pub interval: i64,

    /// Use the onboard sensor FIFO instead of a networked smart meter
    #[clap(short = 'o', long, default_value_t = false)]
    pub onboard: bool,

    /// Hostname/IP of the smart meter, or path of the sensor FIFO
    #[clap(short = 'a', long, value_name = "ADDRESS")]
    pub address: Option<String>,

    /// Port of the smart meter
    #[clap(short = 'p', long, value_name = "PORT", default_value = "7259")]
    pub port: String,

    /// URL of the ingest endpoint to receive the measurements
    #[clap(short = 'u', long, value_name = "URL")]
    pub url: Option<String>,

    /// Token to identify the measurements; defaults to the meter address
    #[clap(short = 't', long, value_name = "TOKEN")]
    pub token: Option<String>,

    /// Number of threads used to upload measurements
    #[clap(short = 'n', long, value_name = "N", default_value_t = 1)]
    pub upload_threads: usize,

    /// Capacity of the upload queue buffering measurements
    #[clap(short = 'b', long, value_name = "N", default_value_t = 36000)]
    pub buffer_size: usize,

    /// Output only values differing from their defaults
    #[clap(short = 's', long, default_value_t = false)]
    pub smart: bool,

    /// Verbose level (0 = errors only .. 4 = trace)
    #[clap(short = 'v', long, value_name = "LEVEL", default_value_t = 1)]
    pub verbose: u8,

    /// Do not output measurements on stdout
    #[clap(short = 'q', long, default_value_t = false)]
    pub quiet: bool,
}
