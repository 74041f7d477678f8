//! Delivery of export artifacts: system clipboard or a file in the downloads directory.

use crate::export::ExportArtifact;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

#[derive(Debug, thiserror::Error)]
pub enum ClipboardError {
    #[error("clipboard does not support {0} here")]
    Unsupported(&'static str),
    #[error("clipboard tool `{tool}` failed: {detail}")]
    Tool { tool: &'static str, detail: String },
    #[error("clipboard I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to save {}: {source}", .path.display())]
    Save {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Clipboard(#[from] ClipboardError),
}

pub trait Clipboard {
    fn write_text(&mut self, text: &str) -> Result<(), ClipboardError>;
    fn write_image(&mut self, png: &[u8]) -> Result<(), ClipboardError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardTool {
    WlCopy,
    Xclip,
    Pbcopy,
}

impl ClipboardTool {
    pub fn program(self) -> &'static str {
        match self {
            ClipboardTool::WlCopy => "wl-copy",
            ClipboardTool::Xclip => "xclip",
            ClipboardTool::Pbcopy => "pbcopy",
        }
    }

    fn text_args(self) -> &'static [&'static str] {
        match self {
            ClipboardTool::WlCopy => &[],
            ClipboardTool::Xclip => &["-selection", "clipboard", "-i"],
            ClipboardTool::Pbcopy => &[],
        }
    }

    fn image_args(self) -> Option<&'static [&'static str]> {
        match self {
            ClipboardTool::WlCopy => Some(&["--type", "image/png"]),
            ClipboardTool::Xclip => Some(&["-selection", "clipboard", "-t", "image/png", "-i"]),
            ClipboardTool::Pbcopy => None,
        }
    }

    /// First tool usable in this session: Wayland, then X11, then macOS.
    pub fn detect() -> Option<Self> {
        let wayland = std::env::var_os("WAYLAND_DISPLAY").is_some();
        let x11 = std::env::var_os("DISPLAY").is_some();
        [
            (ClipboardTool::WlCopy, wayland),
            (ClipboardTool::Xclip, x11),
            (ClipboardTool::Pbcopy, cfg!(target_os = "macos")),
        ]
        .into_iter()
        .find(|(tool, usable)| *usable && find_in_path(tool.program()).is_some())
        .map(|(tool, _)| tool)
    }
}

fn find_in_path(program: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

/// Platform clipboard through `wl-copy`/`xclip`/`pbcopy`. Text falls back to an OSC 52 escape
/// when no tool is available and stderr is a terminal; images have no such fallback.
#[derive(Debug, Clone, Default)]
pub struct SystemClipboard {
    backend: Option<(ClipboardTool, PathBuf)>,
}

impl SystemClipboard {
    pub fn detect() -> Self {
        let tool = ClipboardTool::detect();
        tracing::debug!(tool = tool.map(ClipboardTool::program), "clipboard backend");
        Self::with_tool(tool)
    }

    /// Uses `tool`, resolved through `PATH` when it is spawned. `None` disables the tools.
    pub fn with_tool(tool: Option<ClipboardTool>) -> Self {
        Self {
            backend: tool.map(|t| {
                let program = find_in_path(t.program()).unwrap_or_else(|| t.program().into());
                (t, program)
            }),
        }
    }

    /// Speaks `tool`'s command line but runs the executable at `program`.
    pub fn with_program(tool: ClipboardTool, program: impl Into<PathBuf>) -> Self {
        Self {
            backend: Some((tool, program.into())),
        }
    }
}

impl Clipboard for SystemClipboard {
    fn write_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        match &self.backend {
            Some((tool, program)) => pipe_to(*tool, program, tool.text_args(), text.as_bytes()),
            None => {
                let mut stderr = std::io::stderr();
                if !stderr.is_terminal() {
                    return Err(ClipboardError::Unsupported("text"));
                }
                stderr.write_all(osc52_sequence(text).as_bytes())?;
                stderr.flush()?;
                Ok(())
            }
        }
    }

    fn write_image(&mut self, png: &[u8]) -> Result<(), ClipboardError> {
        let (tool, program) = self
            .backend
            .as_ref()
            .ok_or(ClipboardError::Unsupported("images"))?;
        let args = tool.image_args().ok_or(ClipboardError::Unsupported("images"))?;
        pipe_to(*tool, program, args, png)
    }
}

/// Feeds `payload` to the tool and waits for it to exit.
///
/// `xclip` and `wl-copy` fork a child that keeps serving the selection with the inherited
/// descriptors, so no output pipe may be read to EOF here.
fn pipe_to(
    tool: ClipboardTool,
    program: &Path,
    args: &[&str],
    payload: &[u8],
) -> Result<(), ClipboardError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(payload)?;
    }
    let status = child.wait()?;
    if status.success() {
        return Ok(());
    }
    Err(ClipboardError::Tool {
        tool: tool.program(),
        detail: status.to_string(),
    })
}

/// OSC 52 "set clipboard" escape carrying `text` as base64.
pub fn osc52_sequence(text: &str) -> String {
    format!("\x1b]52;c;{}\x07", STANDARD.encode(text.as_bytes()))
}

/// The downloads directory. Saved files never overwrite: a taken name gets a ` (n)` suffix the
/// way browsers do it.
#[derive(Debug, Clone)]
pub struct Downloads {
    dir: PathBuf,
}

impl Downloads {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `artifact` through a temporary file that is persisted under a free name, so a
    /// failed write never leaves a partial file behind.
    pub fn save(&self, artifact: &ExportArtifact) -> Result<PathBuf, SinkError> {
        let save_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| SinkError::Save { path, source }
        };
        std::fs::create_dir_all(&self.dir).map_err(save_err(&self.dir))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(save_err(&self.dir))?;
        let written = tmp.write_all(&artifact.bytes).and_then(|()| tmp.flush());
        written.map_err(save_err(tmp.path()))?;

        let mut n = 0usize;
        loop {
            let path = self.dir.join(numbered_name(artifact.filename, n));
            if path.exists() {
                n += 1;
                continue;
            }
            match tmp.persist_noclobber(&path) {
                Ok(_) => {
                    tracing::info!(path = %path.display(), mime = artifact.mime, "saved download");
                    return Ok(path);
                }
                Err(err) if err.error.kind() == std::io::ErrorKind::AlreadyExists => {
                    tmp = err.file;
                    n += 1;
                }
                Err(err) => return Err(SinkError::Save { path, source: err.error }),
            }
        }
    }
}

fn numbered_name(filename: &str, n: usize) -> String {
    if n == 0 {
        return filename.to_string();
    }
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem} ({n}).{ext}"),
        _ => format!("{filename} ({n})"),
    }
}

/// Where a copied image ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    Clipboard,
    Downloaded(PathBuf),
}

/// Clipboard plus downloads, with the copy-image fallback between them.
pub struct Sink<C> {
    clipboard: C,
    downloads: Downloads,
}

impl<C: Clipboard> Sink<C> {
    pub fn new(clipboard: C, downloads: Downloads) -> Self {
        Self {
            clipboard,
            downloads,
        }
    }

    pub fn downloads(&self) -> &Downloads {
        &self.downloads
    }

    /// Copies a PNG; when the clipboard refuses it, the same bytes are downloaded instead.
    pub fn copy_image(&mut self, png: Vec<u8>) -> Result<CopyOutcome, SinkError> {
        match self.clipboard.write_image(&png) {
            Ok(()) => Ok(CopyOutcome::Clipboard),
            Err(err) => {
                tracing::warn!(error = %err, "clipboard image write failed, downloading instead");
                let artifact = ExportArtifact {
                    filename: crate::export::PNG_FILENAME,
                    mime: "image/png",
                    bytes: png,
                };
                self.downloads.save(&artifact).map(CopyOutcome::Downloaded)
            }
        }
    }

    pub fn copy_text(&mut self, text: &str) -> Result<(), SinkError> {
        Ok(self.clipboard.write_text(text)?)
    }

    pub fn download(&self, artifact: &ExportArtifact) -> Result<PathBuf, SinkError> {
        self.downloads.save(artifact)
    }
}
