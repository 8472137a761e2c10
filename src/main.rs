use clap::{Parser, Subcommand, ValueEnum};
use pagestitch::{naming, CaptureMode};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pagestitch", version, about = "Capture tall web pages as stitched PNG + paginated PDF")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Capture a page and write its PNG, PDF and manifest row
    Capture(CaptureArgs),
    /// Print the artifact filename for the given inputs
    Filename {
        #[arg(long, value_enum)]
        mode: ModeArg,
        #[arg(long)]
        index: u32,
        #[arg(long)]
        page_name: String,
        #[arg(long)]
        login_state: String,
        #[arg(long)]
        version: String,
        #[arg(long)]
        date: String,
        #[arg(long, default_value = "png")]
        ext: String,
    },
    /// Print the artifact folder for the given inputs
    Folder {
        #[arg(long, value_enum)]
        mode: ModeArg,
        #[arg(long)]
        name: String,
        #[arg(long)]
        version: String,
        #[arg(long)]
        date: String,
    },
}

#[derive(clap::Args)]
#[cfg_attr(not(feature = "cdp"), allow(dead_code))]
struct CaptureArgs {
    /// Page to capture
    #[arg(long)]
    url: String,
    /// Session JSON: mode, date, flow_or_set_name, login_state, version
    #[arg(long)]
    session: PathBuf,
    /// Optional capture config JSON; missing keys keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    index: u32,
    #[arg(long)]
    page_name: String,
    #[arg(long, default_value = "")]
    description: String,
    /// Output root directory
    #[arg(long, default_value = ".")]
    out: PathBuf,
    /// Attach to a running browser at this DevTools websocket URL
    #[arg(long)]
    ws: Option<String>,
    /// Show the browser window
    #[arg(long)]
    headful: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Flow,
    Set,
}

impl From<ModeArg> for CaptureMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Flow => CaptureMode::Flow,
            ModeArg::Set => CaptureMode::Set,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Capture(args) => capture(args),
        Command::Filename {
            mode,
            index,
            page_name,
            login_state,
            version,
            date,
            ext,
        } => {
            println!(
                "{}",
                naming::generate_filename(mode.into(), index, &page_name, &login_state, &version, &date, &ext)
            );
            Ok(())
        }
        Command::Folder { mode, name, version, date } => {
            println!("{}", naming::folder_path(&date, &version, mode.into(), &name));
            Ok(())
        }
    }
}

#[cfg(feature = "cdp")]
fn load_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> anyhow::Result<T> {
    use anyhow::Context;
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

#[cfg(feature = "cdp")]
fn capture(args: CaptureArgs) -> anyhow::Result<()> {
    use pagestitch::cdp::{CdpConfig, CdpConnector};
    use pagestitch::pipeline::{CapturePipeline, CaptureRequest};
    use pagestitch::sink::DirectorySink;
    use pagestitch::{CaptureConfig, SessionConfig};

    let session: SessionConfig = load_json(&args.session)?;
    let config: CaptureConfig = match &args.config {
        Some(path) => load_json(path)?,
        None => CaptureConfig::default(),
    };

    let mut connector = CdpConnector::launch(CdpConfig {
        headless: !args.headful,
        websocket_url: args.ws.clone(),
        window_size: (config.capture_width, config.viewport_height),
        ..Default::default()
    })?;
    let mut sink = DirectorySink::new(&args.out);
    let mut pipeline = CapturePipeline::new(config, session)?;
    pipeline.load_manifest(&sink)?;

    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let request = CaptureRequest::new(args.index, args.page_name, timestamp).with_description(args.description);
    let outcome = pipeline.run(&mut connector, &args.url, &request, &mut sink)?;

    println!("{}{}", outcome.folder, outcome.png_filename);
    println!("{}{}", outcome.folder, outcome.pdf_filename);
    if outcome.duplicate {
        eprintln!("note: {} was already captured in this session", args.url);
    }
    Ok(())
}

#[cfg(not(feature = "cdp"))]
fn capture(args: CaptureArgs) -> anyhow::Result<()> {
    anyhow::bail!("pagestitch was built without the `cdp` feature; rebuild with --features cdp to capture {}", args.url)
}
