//! detectnet - locate objects in a live video stream
//!
//! 1. Reads arguments, config file and DETECTNET_* environment variables
//! 2. Loads the detection network, opens the input and output streams
//! 3. Runs the frame loop until the input stops streaming
//! 4. Prints a run summary

use anyhow::Result;
use std::process::ExitCode;

use detect_stream::cli::{parse_args, Args, ParseOutcome, StartupContext, StartupError, StartupStage};
use detect_stream::config::DetectConfig;
use detect_stream::detect::{Network, NetworkRegistry};
use detect_stream::frame::HostAllocator;
use detect_stream::ingest::{open_source, Source};
use detect_stream::output::{open_sink, Sink};
use detect_stream::pipeline::{FrameLoop, RunSummary};
use detect_stream::ui::Ui;

struct Session {
    config: DetectConfig,
    network: Box<dyn Network>,
    source: Box<dyn Source>,
    sink: Box<dyn Sink>,
}

impl Session {
    fn start(args: &Args) -> Result<Self, StartupError> {
        let config = DetectConfig::load(args.config.as_deref(), &args.overrides())
            .stage(StartupStage::Config)?;
        let ui = Ui::detect(config.ui);

        let network = {
            let _stage = ui.stage(&format!("Load network {}", config.network));
            NetworkRegistry::builtin()
                .build(&config.network, &config.network_settings())
                .stage(StartupStage::Network)?
        };
        let source = {
            let _stage = ui.stage("Open input stream");
            open_source(&config.input, &config.source_options()).stage(StartupStage::Input)?
        };
        let sink = {
            let _stage = ui.stage("Open output stream");
            open_sink(&config.output, &ui).stage(StartupStage::Output)?
        };

        Ok(Self {
            config,
            network,
            source,
            sink,
        })
    }

    fn run(&mut self) -> Result<RunSummary> {
        let mut allocator = HostAllocator::new();
        let stdout = std::io::stdout();
        let mut report = stdout.lock();
        let mut frame_loop = FrameLoop::new(self.config.loop_settings());
        frame_loop.run(
            self.network.as_mut(),
            self.source.as_mut(),
            self.sink.as_mut(),
            &mut allocator,
            &mut report,
        )
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match parse_args(std::env::args_os()) {
        ParseOutcome::Run(args) => args,
        ParseOutcome::Exit(text) => {
            print!("{}", text);
            return ExitCode::SUCCESS;
        }
    };

    let mut session = match Session::start(&args) {
        Ok(session) => session,
        Err(err) => {
            log::error!("detectnet: {}", err);
            return ExitCode::from(err.exit_code() as u8);
        }
    };

    match session.run() {
        Ok(summary) => {
            log::info!("detectnet: shutdown complete, {}", summary);
            if session.config.profile {
                log::info!("detectnet: stage totals {}", summary.timings);
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("detectnet: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
