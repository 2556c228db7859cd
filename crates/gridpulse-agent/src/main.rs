//! The agent binary: wires the sampling source, the stdout views, and
//! the upload pool together and drives the shutdown.

use std::fmt::Write as _;
use std::io;

use clap::Parser;
use gridpulse_agent::args::Args;
use gridpulse_agent::pipe::PipeSampler;
use gridpulse_agent::sampler::Sampler;
use gridpulse_agent::smartmeter::{MeterError, SmartMeter};
use gridpulse_agent::uploader::Uploader;
use gridpulse_common::measurement::{Measurement, VarId};
use tracing::{debug, error, info, warn};

/// How often the status line with the queue depth is emitted.
const STATUS_EVERY: i64 = 60;

#[derive(thiserror::Error, Debug)]
enum AgentError {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("failed to initialize smart meter: {0}")]
    Meter(#[from] MeterError),
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // help and version are normal exits; a bad command line is an
            // initialization failure
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    enable_logging(&args);
    debug!("command line: {args:?}");

    if let Err(e) = run(args) {
        error!("{e}");
        std::process::exit(1);
    }
}

enum Source {
    Meter(SmartMeter),
    Pipe(PipeSampler),
}

impl Source {
    fn sample(&mut self) -> Option<Measurement> {
        match self {
            Source::Meter(meter) => meter.sample(),
            Source::Pipe(pipe) => pipe.sample(),
        }
    }
}

fn run(args: Args) -> Result<(), AgentError> {
    let mut source = if args.onboard {
        Source::Pipe(PipeSampler::new(args.address.as_deref()))
    } else {
        Source::Meter(SmartMeter::new(
            args.address.as_deref(),
            &args.port,
            args.interval,
        )?)
    };

    // measurements identify themselves by the meter address unless a
    // token is configured
    let token = match (&args.token, &source) {
        (Some(token), _) => token.clone(),
        (None, Source::Meter(meter)) => meter.address().to_string(),
        (None, Source::Pipe(_)) => String::new(),
    };

    let uploader = match &args.url {
        Some(url) => Some(Uploader::new(
            url,
            &token,
            args.buffer_size,
            args.upload_threads,
        )?),
        None => None,
    };

    if !args.quiet && !args.smart {
        print_header();
    }

    if args.count != 0 {
        // the pipe source blocks on its own input, so it runs unpaced
        let interval = if args.onboard { -1 } else { args.interval };

        let upload = uploader.as_ref().map(|u| u.handle());
        let count = args.count;
        let quiet = args.quiet;
        let smart = args.smart;
        let mut measured: i64 = 0;

        let sampler = Sampler::start(interval, move |control| {
            let Some(measurement) = source.sample() else {
                return;
            };

            if !quiet {
                if smart {
                    print_differences(&measurement);
                } else {
                    print_row(&measurement);
                }
            }

            if let Some(upload) = &upload
                && upload.send(measurement.to_json(&token)).is_err()
            {
                warn!("unable to upload measurement, dropping it");
            }

            measured += 1;
            if measured % STATUS_EVERY == 0 {
                let buffered = upload.as_ref().map(|u| u.buffered()).unwrap_or(0);
                info!("measurements: {measured}, buffered: {buffered}");
            }

            if count > 0 && measured >= count {
                control.stop();
            }
        })?;

        let control = sampler.control();
        if let Err(e) = ctrlc::set_handler(move || {
            info!("received ctrl-c, stopping...");
            control.stop();
        }) {
            warn!("failed to install signal handler: {e}");
        }

        sampler.join()?;
    }

    if let Some(uploader) = uploader {
        uploader.shutdown();
    }

    Ok(())
}

fn print_header() {
    let names: Vec<&str> = VarId::ALL.iter().map(|id| id.name()).collect();
    println!("#{}", names.join("\t"));
}

fn print_row(measurement: &Measurement) {
    let row: Vec<String> = VarId::ALL
        .iter()
        .map(|id| format!("{:.6}", measurement[*id]))
        .collect();
    println!("{}", row.join("\t"));
}

fn print_differences(measurement: &Measurement) {
    let mut line = String::new();
    for id in VarId::ALL {
        let value = measurement[id];
        if value != 0.0 && value != -1.0 {
            let _ = write!(line, "{}: {:.6}; ", id.name(), value);
        }
    }
    println!("{line}");
}

fn enable_logging(args: &Args) {
    let level = match args.verbose {
        0 => tracing::Level::ERROR,
        1 => tracing::Level::WARN,
        2 => tracing::Level::INFO,
        3 => tracing::Level::DEBUG,
        4.. => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .compact()
        .with_writer(io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_max_level(level)
        .init();
}
