use futures::executor::block_on;
use merview::config::{ConfigError, default_config_path};
use merview::export::ExportError;
use merview::prefs::{Preferences, PrefsError};
use merview::session::EditorMarker;
use merview::share::{self, ShareError};
use merview::sink::{CopyOutcome, SinkError};
use merview::{
    Downloads, ExportArtifact, Rasterizer, Renderer, Session, Sink, SystemClipboard, Theme,
    ViewerConfig, examples,
};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug)]
enum CliError {
    Usage(&'static str),
    Io(std::io::Error),
    Config(ConfigError),
    Prefs(PrefsError),
    Share(ShareError),
    Export(ExportError),
    Sink(SinkError),
    Diagram(EditorMarker),
    UnknownExample(String),
    InvalidShareLink,
    NoDiagram,
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Usage(msg) => write!(f, "{msg}"),
            CliError::Io(err) => write!(f, "I/O error: {err}"),
            CliError::Config(err) => write!(f, "{err}"),
            CliError::Prefs(err) => write!(f, "{err}"),
            CliError::Share(err) => write!(f, "{err}"),
            CliError::Export(err) => write!(f, "{err}"),
            CliError::Sink(err) => write!(f, "{err}"),
            CliError::Diagram(marker) => write!(f, "line {}: {}", marker.line, marker.message),
            CliError::UnknownExample(name) => {
                write!(f, "unknown example {name:?}; run `merview examples` for the list")
            }
            CliError::InvalidShareLink => write!(f, "share link does not contain a diagram"),
            CliError::NoDiagram => write!(f, "No Mermaid diagram detected"),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ConfigError> for CliError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<PrefsError> for CliError {
    fn from(value: PrefsError) -> Self {
        Self::Prefs(value)
    }
}

impl From<ShareError> for CliError {
    fn from(value: ShareError) -> Self {
        Self::Share(value)
    }
}

impl From<ExportError> for CliError {
    fn from(value: ExportError) -> Self {
        Self::Export(value)
    }
}

impl From<SinkError> for CliError {
    fn from(value: SinkError) -> Self {
        Self::Sink(value)
    }
}

#[derive(Debug, Clone, Copy, Default)]
enum Command {
    #[default]
    Render,
    Export,
    Copy,
    Share,
    Open,
    Examples,
    Detect,
    Split,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Code,
    Svg,
    Png,
    Share,
}

impl FromStr for Format {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "code" | "mmd" => Ok(Self::Code),
            "svg" => Ok(Self::Svg),
            "png" => Ok(Self::Png),
            "share" | "url" => Ok(Self::Share),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Default)]
struct Args {
    command: Command,
    input: Option<String>,
    format: Option<Format>,
    theme: Option<Theme>,
    scale: Option<f32>,
    background: Option<String>,
    base_url: Option<String>,
    config: Option<PathBuf>,
    downloads: Option<PathBuf>,
    out: Option<String>,
}

fn usage() -> &'static str {
    "merview\n\
\n\
USAGE:\n\
  merview [render] [--theme <name>] [--out <path>] [<path>|-]\n\
  merview export --format svg|png|mmd [--scale <n>] [--background <color>] [--theme <name>] [--out <path>] [<path>|-]\n\
  merview copy --format code|svg|png|share [--theme <name>] [--background <color>] [<path>|-]\n\
  merview share [--base-url <url>] [<path>|-]\n\
  merview open [--out <path>] <url-or-fragment>\n\
  merview examples [<name>]\n\
  merview detect [<path>|-]\n\
  merview split [<ratio>]\n\
\n\
OPTIONS:\n\
  --config <path>     viewer config (JSON5); defaults to the platform config directory\n\
  --downloads <dir>   where exported files are saved (default: current directory)\n\
\n\
NOTES:\n\
  - If <path> is omitted or '-', input is read from stdin.\n\
  - Themes: default, neutral, dark, forest, base.\n\
  - --background takes an opaque #rgb, #rrggbb, rgb(r, g, b), white or black.\n\
  - --scale is the preview zoom: 0.5 to 3 in steps of 0.25.\n\
  - Copying an image falls back to saving diagram.png when the clipboard refuses it.\n\
  - MERVIEW_LOG sets the log filter (default: warn); MERVIEW_CLIPBOARD=off disables the clipboard.\n\
"
}

fn parse_args(argv: &[String]) -> Result<Args, CliError> {
    let mut args = Args::default();
    let mut command_seen = false;

    let mut it = argv.iter().skip(1);
    while let Some(a) = it.next() {
        let mut value = || it.next().cloned().ok_or(CliError::Usage(usage()));
        match a.as_str() {
            "--help" | "-h" => return Err(CliError::Usage(usage())),
            "--format" => {
                let format = value()?;
                args.format = Some(
                    format
                        .parse::<Format>()
                        .map_err(|_| CliError::Usage(usage()))?,
                );
            }
            "--theme" => {
                let theme = value()?;
                args.theme = Some(theme.parse::<Theme>().map_err(|_| CliError::Usage(usage()))?);
            }
            "--scale" => {
                let scale = value()?
                    .parse::<f32>()
                    .map_err(|_| CliError::Usage(usage()))?;
                if !(scale.is_finite() && scale > 0.0) {
                    return Err(CliError::Usage(usage()));
                }
                args.scale = Some(scale);
            }
            "--background" => {
                let bg = value()?;
                if !bg.trim().is_empty() {
                    args.background = Some(bg.trim().to_string());
                }
            }
            "--base-url" => args.base_url = Some(value()?),
            "--config" => args.config = Some(PathBuf::from(value()?)),
            "--downloads" => args.downloads = Some(PathBuf::from(value()?)),
            "--out" => args.out = Some(value()?),
            "--" => {
                if let Some(rest) = it.next() {
                    if args.input.is_some() {
                        return Err(CliError::Usage(usage()));
                    }
                    args.input = Some(rest.clone());
                }
                if it.next().is_some() {
                    return Err(CliError::Usage(usage()));
                }
            }
            other if other.starts_with('-') && other != "-" => {
                return Err(CliError::Usage(usage()));
            }
            word if !command_seen && args.input.is_none() && command(word).is_some() => {
                command_seen = true;
                if let Some(cmd) = command(word) {
                    args.command = cmd;
                }
            }
            path => {
                if args.input.is_some() {
                    return Err(CliError::Usage(usage()));
                }
                args.input = Some(path.to_string());
            }
        }
    }

    let format_ok = match (args.command, args.format) {
        (Command::Export, Some(f)) => f != Format::Share,
        (Command::Copy, Some(_)) => true,
        (Command::Export | Command::Copy, None) => false,
        (_, None) => true,
        (_, Some(_)) => false,
    };
    if !format_ok {
        return Err(CliError::Usage(usage()));
    }
    if matches!(args.command, Command::Open) && args.input.is_none() {
        return Err(CliError::Usage(usage()));
    }

    Ok(args)
}

fn command(word: &str) -> Option<Command> {
    Some(match word {
        "render" => Command::Render,
        "export" => Command::Export,
        "copy" => Command::Copy,
        "share" => Command::Share,
        "open" => Command::Open,
        "examples" => Command::Examples,
        "detect" => Command::Detect,
        "split" => Command::Split,
        _ => return None,
    })
}

fn read_input(input: Option<&str>) -> Result<String, CliError> {
    match input {
        None | Some("-") => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
        Some(path) => Ok(std::fs::read_to_string(path)?),
    }
}

fn write_text(text: &str, out: Option<&str>) -> Result<(), CliError> {
    match out {
        None | Some("-") => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            if !text.ends_with('\n') {
                stdout.write_all(b"\n")?;
            }
            Ok(())
        }
        Some(path) => {
            std::fs::write(path, text)?;
            Ok(())
        }
    }
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("MERVIEW_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    // A second init only happens in tests; ignore it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn clipboard() -> SystemClipboard {
    let disabled = std::env::var("MERVIEW_CLIPBOARD")
        .is_ok_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "off" | "0" | "none"));
    if disabled {
        SystemClipboard::with_tool(None)
    } else {
        SystemClipboard::detect()
    }
}

/// Settings after layering CLI flags over the config file.
struct Context {
    config: ViewerConfig,
    theme: Theme,
    renderer: Renderer,
}

impl Context {
    fn load(args: &Args) -> Result<Self, CliError> {
        let path = args.config.clone().unwrap_or_else(default_config_path);
        let mut config = ViewerConfig::load(&path)?;
        if let Some(dir) = &args.downloads {
            config.downloads = Some(dir.clone());
        }
        if let Some(bg) = &args.background {
            config.background = Some(bg.clone());
        }
        if let Some(scale) = args.scale {
            config.scale = scale;
        }
        if let Some(base) = &args.base_url {
            config.share_base_url = base.clone();
        }
        let theme = args.theme.unwrap_or(config.theme);
        Ok(Self {
            config,
            theme,
            renderer: Renderer::new(),
        })
    }

    fn session(&self, source: String) -> Session {
        let mut session = Session::new(source, self.theme);
        session.viewport_mut().set_zoom(self.config.scale);
        session
    }

    /// Renders the session, turning a failed render into [`CliError::Diagram`].
    fn render(&self, session: &mut Session) -> Result<String, CliError> {
        block_on(session.render_with(&self.renderer));
        match (session.svg(), session.marker()) {
            (Some(svg), _) => Ok(svg.to_string()),
            (None, Some(marker)) => Err(CliError::Diagram(marker)),
            (None, None) => Err(CliError::NoDiagram),
        }
    }

    fn sink(&self) -> Sink<SystemClipboard> {
        Sink::new(clipboard(), Downloads::new(self.config.downloads_dir()))
    }
}

fn run(args: Args) -> Result<(), CliError> {
    let ctx = Context::load(&args)?;

    match args.command {
        Command::Render => {
            let mut session = ctx.session(read_input(args.input.as_deref())?);
            let svg = ctx.render(&mut session)?;
            write_text(&svg, args.out.as_deref())
        }
        Command::Export => {
            let source = read_input(args.input.as_deref())?;
            let artifact = match args.format {
                Some(Format::Code) => ExportArtifact::source(&source),
                Some(Format::Svg) => {
                    let mut session = ctx.session(source);
                    ctx.render(&mut session)?;
                    session.export_svg()?
                }
                _ => {
                    let mut session = ctx.session(source);
                    ctx.render(&mut session)?;
                    let raster = session.export_png(
                        &Rasterizer::with_system_fonts(),
                        ctx.config.background.as_deref(),
                    )?;
                    ExportArtifact::png(raster)
                }
            };
            let saved = match args.out.as_deref() {
                Some(out) => {
                    std::fs::write(out, &artifact.bytes)?;
                    PathBuf::from(out)
                }
                None => ctx.sink().download(&artifact)?,
            };
            println!("{}", saved.display());
            Ok(())
        }
        Command::Copy => {
            let source = read_input(args.input.as_deref())?;
            let mut sink = ctx.sink();
            let text = match args.format {
                Some(Format::Code) => source,
                Some(Format::Share) => share::share_url(&ctx.config.share_base_url, &source)?,
                Some(Format::Svg) => {
                    let mut session = ctx.session(source);
                    ctx.render(&mut session)?;
                    String::from_utf8_lossy(&session.export_svg()?.bytes).into_owned()
                }
                _ => {
                    let mut session = ctx.session(source);
                    ctx.render(&mut session)?;
                    let png = session.copy_png_bytes(
                        &Rasterizer::with_system_fonts(),
                        ctx.config.background.as_deref(),
                    )?;
                    match sink.copy_image(png)? {
                        CopyOutcome::Clipboard => eprintln!("copied image to clipboard"),
                        CopyOutcome::Downloaded(path) => println!("{}", path.display()),
                    }
                    return Ok(());
                }
            };
            if let Err(err) = sink.copy_text(&text) {
                tracing::warn!(error = %err, "clipboard unavailable, printing instead");
                return write_text(&text, None);
            }
            eprintln!("copied to clipboard");
            Ok(())
        }
        Command::Share => {
            let source = read_input(args.input.as_deref())?;
            let url = ctx.session(source).share_url(&ctx.config.share_base_url)?;
            write_text(&url, None)
        }
        Command::Open => {
            let link = args.input.as_deref().unwrap_or_default();
            let source = share::source_from_url(link).ok_or(CliError::InvalidShareLink)?;
            write_text(&source, args.out.as_deref())
        }
        Command::Examples => match args.input.as_deref() {
            None => {
                for name in examples::names() {
                    println!("{name}");
                }
                Ok(())
            }
            Some(name) => {
                let source =
                    examples::get(name).ok_or_else(|| CliError::UnknownExample(name.to_string()))?;
                write_text(source, args.out.as_deref())
            }
        },
        Command::Detect => {
            let source = read_input(args.input.as_deref())?;
            let kind = ctx.renderer.detect(&source).ok_or(CliError::NoDiagram)?;
            write_text(&kind, None)
        }
        Command::Split => {
            let mut prefs = Preferences::load(ctx.config.prefs_path())?;
            let ratio = match args.input.as_deref() {
                None => prefs.split_ratio(),
                Some(raw) => {
                    let ratio = raw
                        .parse::<f64>()
                        .map_err(|_| CliError::Usage(usage()))?;
                    prefs.set_split_ratio(ratio)?
                }
            };
            write_text(&ratio.to_string(), None)
        }
    }
}

fn main() {
    init_logging();

    let args = match parse_args(&std::env::args().collect::<Vec<_>>()) {
        Ok(v) => v,
        Err(CliError::Usage(msg)) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    match run(args) {
        Ok(()) => {}
        Err(CliError::Usage(msg)) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
        Err(err @ (CliError::Diagram(_) | CliError::NoDiagram)) => {
            eprintln!("{err}");
            std::process::exit(3);
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    }
}
