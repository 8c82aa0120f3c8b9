use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use ratat::bad_editor::DEFAULT_DROP_CHANNELS;
use ratat::paths::{filtered_path, scan_directory};
use ratat::report::write_fooof_report;
use ratat::settings::DEFAULT_CONFIG_PATH;
use ratat::splitter::{DEFAULT_LEFT_SUFFIX, DEFAULT_RIGHT_SUFFIX};
use ratat::{
    BadEditor, ChannelSplitter, DisplayMode, LogNotifier, MarkCatalogue, PsdSession, RatatError, Recording, Result,
    Session, Settings, Side,
};

#[derive(Parser)]
#[command(name = "ratat", version, about = "Rodent EDF/BDF filtering, PSD and FOOOF reports")]
struct Cli {
    /// Log level
    #[arg(short, long, value_enum, default_value_t = LogLevel::Info, global = true)]
    log: LogLevel,

    /// Settings file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// List recordings in a directory and whether they were filtered
    List { dir: PathBuf },

    /// Drop the accelerometer, band-pass and save to 01_filtered
    Filter {
        file: PathBuf,
        #[arg(long)]
        keep_accelerometer: bool,
    },

    /// Write the PSD report of the filtered recording
    Psd {
        file: PathBuf,
        #[arg(long)]
        amplitude: bool,
    },

    /// Write the FOOOF workbook and figure of the filtered recording
    Fooof {
        file: PathBuf,
        /// Upper frequency cut, Hz (default: max filter frequency)
        #[arg(long)]
        max_freq: Option<f64>,
    },

    /// Split channels into two files
    Split {
        file: PathBuf,
        /// Channels for the left file (comma-separated)
        #[arg(long, value_delimiter = ',')]
        left: Vec<String>,
        /// Channels for the right file (comma-separated)
        #[arg(long, value_delimiter = ',')]
        right: Vec<String>,
        /// Move the second half of the channels to the right file
        #[arg(long)]
        even: bool,
        #[arg(long, default_value = DEFAULT_LEFT_SUFFIX)]
        left_suffix: String,
        #[arg(long, default_value = DEFAULT_RIGHT_SUFFIX)]
        right_suffix: String,
    },

    /// Print one page of marks of the filtered recording
    Marks {
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },

    /// Show settings, optionally changing some of them
    Settings {
        /// key=value
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },
}

fn load_filtered(file: &Path) -> Result<Recording> {
    let path = filtered_path(file)?;
    if !path.is_file() {
        return Err(RatatError::FileNotFound(format!(
            "{} (run `ratat filter` first)",
            path.display()
        )));
    }
    Recording::load(path)
}

fn list(dir: &Path) -> Result<()> {
    for entry in scan_directory(dir)? {
        let mark = if entry.filtered { "F" } else { " " };
        println!("[{mark}] {}", entry.path.display());
    }
    Ok(())
}

fn split(
    file: &Path,
    left: &[String],
    right: &[String],
    even: bool,
    left_suffix: &str,
    right_suffix: &str,
) -> Result<()> {
    let mut splitter = ChannelSplitter::open(file)?;
    if even {
        splitter.auto_split_even();
    }
    if !right.is_empty() {
        splitter.move_channels(right, Side::Left, Side::Right)?;
    }
    if !left.is_empty() {
        // 只保留指定的左侧通道
        let others: Vec<String> = splitter.left().iter().filter(|c| !left.contains(c)).cloned().collect();
        splitter.exclude(&others);
    }
    let (l, r) = splitter.save(left_suffix, right_suffix)?;
    println!("{}\n{}", l.display(), r.display());
    Ok(())
}

fn marks(file: &Path, page: usize) -> Result<()> {
    let recording = load_filtered(file)?;
    let mut catalogue = MarkCatalogue::from_annotations(recording.annotations());
    let page = catalogue.set_page(page);
    println!("page {page}/{}", catalogue.page_count());
    for mark in catalogue.page(page) {
        println!("{:<24} {:>10.3} {:>10.3}", mark.label, mark.start, mark.end);
    }
    Ok(())
}

fn settings(current: &Settings, config: &Path, set: &[String]) -> Result<()> {
    let mut edited = current.clone();
    if !set.is_empty() {
        let pairs = set
            .iter()
            .map(|kv| {
                kv.split_once('=')
                    .ok_or_else(|| RatatError::InvalidParameter(format!("expected KEY=VALUE, got {kv}")))
            })
            .collect::<Result<Vec<_>>>()?;
        edited.set_from_strings(pairs);
        edited.save(config)?;
    }
    println!("{}", serde_json::to_string_pretty(&edited)?);
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log.directive()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let boot = Session::new(Settings::default(), LogNotifier);
    let Some(loaded) = boot.run("load settings", || Settings::load(&cli.config)) else {
        return ExitCode::FAILURE;
    };
    let session = Session::new(loaded, LogNotifier);

    let done = match &cli.command {
        Command::List { dir } => session.run("list", || list(dir)),
        Command::Filter { file, keep_accelerometer } => session.run("filter", || {
            let drop: &[&str] = if *keep_accelerometer { &[] } else { &DEFAULT_DROP_CHANNELS };
            let mut editor = BadEditor::open(&session, file, drop)?;
            let path = editor.accept()?;
            println!("{}", path.display());
            Ok(())
        }),
        Command::Psd { file, amplitude } => session.run("PSD report", || {
            let mut view = PsdSession::new(&session, file, load_filtered(file)?);
            if *amplitude {
                view.set_mode(DisplayMode::Amplitude);
            }
            let path = view.export()?;
            println!("{}", path.display());
            Ok(())
        }),
        Command::Fooof { file, max_freq } => session.run("FOOOF report", || {
            let max_freq = max_freq.unwrap_or(session.settings().max_freq_input);
            let (xlsx, png) = write_fooof_report(file, &load_filtered(file)?, Some(max_freq))?;
            println!("{}\n{}", xlsx.display(), png.display());
            Ok(())
        }),
        Command::Split { file, left, right, even, left_suffix, right_suffix } => {
            session.run("split", || split(file, left, right, *even, left_suffix, right_suffix))
        }
        Command::Marks { file, page } => session.run("marks", || marks(file, *page)),
        Command::Settings { set } => session.run("settings", || settings(session.settings(), &cli.config, set)),
    };

    match done {
        Some(()) => ExitCode::SUCCESS,
        None => ExitCode::FAILURE,
    }
}
