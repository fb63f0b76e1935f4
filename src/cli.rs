//! Command-line surface of `detectnet`.

use clap::error::ErrorKind;
use clap::{CommandFactory, FromArgMatches, Parser};
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;

use crate::config::ConfigOverrides;
use crate::detect::NetworkRegistry;

#[derive(Parser, Debug, Default, Clone)]
#[command(
    name = "detectnet",
    version,
    about = "Locate objects in a live camera stream using an object detection network."
)]
pub struct Args {
    /// Input URI (camera, RTSP stream, video or image files).
    #[arg(value_name = "INPUT")]
    pub input: Option<String>,

    /// Output URI (display://N, image files, null://).
    #[arg(value_name = "OUTPUT")]
    pub output: Option<String>,

    /// Network to load (see the list below).
    #[arg(long, value_name = "NAME")]
    pub network: Option<String>,

    /// Overlay elements: comma-separated box, labels, conf or none.
    #[arg(long, value_name = "FLAGS")]
    pub overlay: Option<String>,

    /// Minimum detection confidence (0-1).
    #[arg(long, value_name = "VALUE")]
    pub threshold: Option<f32>,

    /// Expected input width; sizes the scratch buffer.
    #[arg(long, value_name = "PIXELS")]
    pub input_width: Option<u32>,

    /// Expected input height; sizes the scratch buffer.
    #[arg(long, value_name = "PIXELS")]
    pub input_height: Option<u32>,

    /// Scratch buffer size relative to the input resolution.
    #[arg(long, value_name = "FACTOR")]
    pub scale: Option<f32>,

    /// Capture timeout in milliseconds before a capture reports no frame.
    #[arg(long, value_name = "MS")]
    pub input_timeout_ms: Option<u64>,

    /// Frame rate hint for sources that support it.
    #[arg(long, value_name = "FPS")]
    pub input_rate: Option<u32>,

    /// Replay count for file inputs (-1 loops forever).
    #[arg(long, value_name = "COUNT", allow_negative_numbers = true)]
    pub input_loop: Option<i32>,

    /// Request zero-copy capture buffers where the source supports them.
    #[arg(long)]
    pub input_zero_copy: bool,

    /// Directory holding <network>/model.onnx and labels.txt.
    #[arg(long, value_name = "DIR")]
    pub model_dir: Option<PathBuf>,

    /// TOML or JSON config file.
    #[arg(long, env = "DETECTNET_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log per-stage timings for every frame.
    #[arg(long)]
    pub profile: bool,

    /// Terminal output style: auto, plain or pretty.
    #[arg(long, value_name = "MODE")]
    pub ui: Option<String>,

    /// Options this build does not recognise; they are ignored.
    #[arg(skip)]
    pub ignored: Vec<String>,
}

impl Args {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            input: self.input.clone(),
            output: self.output.clone(),
            network: self.network.clone(),
            overlay: self.overlay.clone(),
            threshold: self.threshold,
            input_width: self.input_width,
            input_height: self.input_height,
            scale: self.scale,
            input_timeout_ms: self.input_timeout_ms,
            input_rate: self.input_rate,
            input_loop: self.input_loop,
            zero_copy: self.input_zero_copy,
            model_dir: self.model_dir.clone(),
            profile: self.profile,
            ui: self.ui.clone(),
        }
    }
}

/// Result of reading the command line.
#[derive(Debug)]
pub enum ParseOutcome {
    Run(Args),
    /// Print the text to stdout and exit successfully.
    Exit(String),
}

/// Help epilog: networks, inputs and outputs.
pub fn epilog() -> String {
    format!(
        "{}\n{}\n{}",
        NetworkRegistry::builtin().usage(),
        crate::ingest::usage(),
        crate::output::usage()
    )
}

pub fn command() -> clap::Command {
    Args::command().after_help(epilog())
}

/// Parse arguments.
///
/// Unrecognised options are dropped with a warning so that options meant for
/// other tools in a launch script don't stop the stream. Any other parse
/// failure becomes a blank line followed by the help text, and a successful
/// exit.
pub fn parse_args<I, T>(args: I) -> ParseOutcome
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let mut command = command();
    let (known, ignored) = split_unrecognized(&command, args);
    for option in &ignored {
        log::warn!("ignoring unrecognized option {}", option);
    }
    let parsed = command
        .try_get_matches_from_mut(known)
        .and_then(|matches| Args::from_arg_matches(&matches));
    match parsed {
        Ok(mut args) => {
            args.ignored = ignored;
            ParseOutcome::Run(args)
        }
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            ParseOutcome::Exit(err.to_string())
        }
        Err(err) => {
            log::debug!("argument parsing failed: {}", err);
            ParseOutcome::Exit(format!("\n{}", command.render_help()))
        }
    }
}

/// Separate options the command defines from those it doesn't. The values of
/// known options are kept with them, even when they start with `-`.
fn split_unrecognized<I, T>(command: &clap::Command, args: I) -> (Vec<OsString>, Vec<String>)
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let mut known = Vec::new();
    let mut ignored = Vec::new();
    let mut args = args.into_iter().map(Into::into);
    known.extend(args.next());

    while let Some(arg) = args.next() {
        let Some(text) = arg.to_str() else {
            known.push(arg);
            continue;
        };
        if text == "--" {
            known.push(arg);
            known.extend(args.by_ref());
            break;
        }
        if !text.starts_with('-') || text == "-" || text.parse::<f64>().is_ok() {
            known.push(arg);
            continue;
        }

        let takes_value = match text.strip_prefix("--") {
            Some(long) => {
                let (name, inline) = match long.split_once('=') {
                    Some((name, _)) => (name, true),
                    None => (long, false),
                };
                if matches!(name, "help" | "version") {
                    Some(false)
                } else {
                    command
                        .get_arguments()
                        .find(|a| a.get_long() == Some(name))
                        .map(|a| !inline && a.get_action().takes_values())
                }
            }
            None => match text.strip_prefix('-') {
                Some("h") | Some("V") => Some(false),
                _ => None,
            },
        };

        match takes_value {
            Some(true) => {
                known.push(arg);
                known.extend(args.next());
            }
            Some(false) => known.push(arg),
            None => ignored.push(text.to_string()),
        }
    }
    (known, ignored)
}

/// Which collaborator failed to come up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartupStage {
    Config,
    Network,
    Input,
    Output,
}

impl StartupStage {
    pub fn exit_code(self) -> i32 {
        match self {
            StartupStage::Config => 1,
            StartupStage::Network => 2,
            StartupStage::Input => 3,
            StartupStage::Output => 4,
        }
    }
}

impl fmt::Display for StartupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StartupStage::Config => "configuration",
            StartupStage::Network => "network",
            StartupStage::Input => "input stream",
            StartupStage::Output => "output stream",
        };
        f.write_str(name)
    }
}

/// A fatal failure before the frame loop starts.
#[derive(Debug)]
pub struct StartupError {
    pub stage: StartupStage,
    pub source: anyhow::Error,
}

impl StartupError {
    pub fn new(stage: StartupStage, source: anyhow::Error) -> Self {
        Self { stage, source }
    }

    pub fn exit_code(&self) -> i32 {
        self.stage.exit_code()
    }
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to create {}: {:#}", self.stage, self.source)
    }
}

impl std::error::Error for StartupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Attach a startup stage to a fallible constructor.
pub trait StartupContext<T> {
    fn stage(self, stage: StartupStage) -> Result<T, StartupError>;
}

impl<T> StartupContext<T> for anyhow::Result<T> {
    fn stage(self, stage: StartupStage) -> Result<T, StartupError> {
        self.map_err(|source| StartupError::new(stage, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(args: &[&str]) -> Args {
        match parse_args(std::iter::once("detectnet").chain(args.iter().copied())) {
            ParseOutcome::Run(args) => args,
            ParseOutcome::Exit(text) => panic!("unexpected exit: {}", text),
        }
    }

    #[test]
    fn positional_uris_and_flags() {
        let args = run(&[
            "synthetic://lab?frames=3",
            "null://",
            "--network=synthetic",
            "--overlay",
            "box,labels",
            "--threshold=0.3",
            "--input-loop",
            "-1",
            "--profile",
        ]);
        assert_eq!(args.input.as_deref(), Some("synthetic://lab?frames=3"));
        assert_eq!(args.output.as_deref(), Some("null://"));
        assert_eq!(args.network.as_deref(), Some("synthetic"));
        assert_eq!(args.overlay.as_deref(), Some("box,labels"));
        assert_eq!(args.threshold, Some(0.3));
        assert_eq!(args.input_loop, Some(-1));
        assert!(args.profile);
        assert_eq!(args.overrides().network.as_deref(), Some("synthetic"));
    }

    #[test]
    fn parse_failure_prints_blank_line_and_help() {
        match parse_args(["detectnet", "--threshold", "high"]) {
            ParseOutcome::Exit(text) => {
                assert!(text.starts_with('\n'));
                assert!(text.contains("Usage:"));
                assert!(text.contains("ssd-mobilenet-v2"));
            }
            ParseOutcome::Run(_) => panic!("bad threshold must not parse"),
        }
    }

    #[test]
    fn unrecognized_options_are_ignored() {
        let args = run(&[
            "synthetic://lab",
            "null://",
            "--network=synthetic",
            "--headless",
            "--input-codec=h264",
            "--threshold",
            "0.25",
            "-x",
        ]);
        assert_eq!(args.input.as_deref(), Some("synthetic://lab"));
        assert_eq!(args.output.as_deref(), Some("null://"));
        assert_eq!(args.network.as_deref(), Some("synthetic"));
        assert_eq!(args.threshold, Some(0.25));
        assert_eq!(args.ignored, ["--headless", "--input-codec=h264", "-x"]);
    }

    #[test]
    fn known_option_values_may_start_with_a_dash() {
        let args = run(&["--input-loop", "-1", "--network", "synthetic"]);
        assert_eq!(args.input_loop, Some(-1));
        assert!(args.ignored.is_empty());
    }

    #[test]
    fn bad_value_for_known_option_still_prints_help() {
        match parse_args(["detectnet", "--headless", "--input-width=wide"]) {
            ParseOutcome::Exit(text) => assert!(text.starts_with('\n')),
            ParseOutcome::Run(_) => panic!("bad width must not parse"),
        }
    }

    #[test]
    fn help_lists_networks_inputs_and_outputs() {
        match parse_args(["detectnet", "--help"]) {
            ParseOutcome::Exit(text) => {
                assert!(text.contains("networks (--network)"));
                assert!(text.contains("synthetic://NAME"));
                assert!(text.contains("display://N"));
            }
            ParseOutcome::Run(_) => panic!("--help must exit"),
        }
    }

    #[test]
    fn startup_stages_map_to_exit_codes() {
        let err: anyhow::Result<()> = Err(anyhow::anyhow!("no such model"));
        let err = err.stage(StartupStage::Network).err().expect("error");
        assert_eq!(err.exit_code(), 2);
        assert_eq!(
            err.to_string(),
            "failed to create network: no such model"
        );
        assert_eq!(StartupStage::Input.exit_code(), 3);
        assert_eq!(StartupStage::Output.exit_code(), 4);
        assert_eq!(StartupStage::Config.exit_code(), 1);
    }
}
