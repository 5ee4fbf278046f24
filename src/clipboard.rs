//! Clipboard support for "copy result as".
//!
//! [`SystemClipboard`] writes to the desktop clipboard with fallbacks:
//! - arboard (Windows, and Linux/macOS sessions it can reach)
//! - `xclip` or `xsel` on Linux, `pbcopy` on macOS
//! - OSC 52 escape sequence on the controlling terminal
//!
//! [`MemoryClipboard`] keeps copies in memory for tests and headless runs.

use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Mutex;
use tracing::debug;

use crate::error::{BdashError, Result};

/// Destination for copied text.
pub trait Clipboard: Send + Sync {
    fn write_text(&self, text: &str) -> Result<()>;
}

/// Clipboard backend chosen for the current platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardBackend {
    Arboard,
    Xclip,
    Xsel,
    Pbcopy,
    /// Terminal escape sequence; works over SSH in most modern terminals.
    Osc52,
}

impl ClipboardBackend {
    /// Detects the best available backend.
    pub fn detect() -> Self {
        if arboard::Clipboard::new().is_ok() {
            return Self::Arboard;
        }

        #[cfg(target_os = "macos")]
        {
            if command_exists("pbcopy", None) {
                return Self::Pbcopy;
            }
        }

        #[cfg(target_os = "linux")]
        {
            if command_exists("xclip", Some("-version")) {
                return Self::Xclip;
            }
            if command_exists("xsel", Some("--version")) {
                return Self::Xsel;
            }
        }

        Self::Osc52
    }
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
fn command_exists(program: &str, probe_arg: Option<&str>) -> bool {
    let mut command = Command::new(program);
    if let Some(arg) = probe_arg {
        command.arg(arg);
    }
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

/// The desktop clipboard.
pub struct SystemClipboard {
    backend: ClipboardBackend,
    native: Mutex<Option<arboard::Clipboard>>,
}

impl SystemClipboard {
    /// Detects a backend and opens it.
    pub fn new() -> Result<Self> {
        Self::with_backend(ClipboardBackend::detect())
    }

    pub fn with_backend(backend: ClipboardBackend) -> Result<Self> {
        let native = match backend {
            ClipboardBackend::Arboard => Some(arboard::Clipboard::new().map_err(|e| {
                BdashError::clipboard(format!("Failed to initialize clipboard: {}", e))
            })?),
            _ => None,
        };
        debug!(?backend, "Clipboard backend selected");

        Ok(Self {
            backend,
            native: Mutex::new(native),
        })
    }

    pub fn backend(&self) -> ClipboardBackend {
        self.backend
    }

    fn copy_native(&self, text: &str) -> Result<()> {
        let mut guard = self
            .native
            .lock()
            .map_err(|_| BdashError::clipboard("Failed to acquire clipboard lock"))?;
        let clipboard = guard
            .as_mut()
            .ok_or_else(|| BdashError::clipboard("Clipboard not initialized"))?;
        clipboard
            .set_text(text)
            .map_err(|e| BdashError::clipboard(format!("Failed to copy to clipboard: {}", e)))
    }
}

impl std::fmt::Debug for SystemClipboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemClipboard")
            .field("backend", &self.backend)
            .finish()
    }
}

impl Clipboard for SystemClipboard {
    fn write_text(&self, text: &str) -> Result<()> {
        match self.backend {
            ClipboardBackend::Arboard => self.copy_native(text),
            ClipboardBackend::Xclip => pipe_to("xclip", &["-selection", "clipboard"], text),
            ClipboardBackend::Xsel => pipe_to("xsel", &["--clipboard", "--input"], text),
            ClipboardBackend::Pbcopy => pipe_to("pbcopy", &[], text),
            ClipboardBackend::Osc52 => {
                let mut stdout = std::io::stdout();
                write_osc52(&mut stdout, text)
            }
        }
    }
}

/// Feeds `text` to a copy command on stdin.
fn pipe_to(program: &str, args: &[&str], text: &str) -> Result<()> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| BdashError::clipboard(format!("Failed to spawn {}: {}", program, e)))?;

    // stdin is dropped before waiting so the child sees EOF, and the child is
    // reaped even when the write fails.
    let written = match child.stdin.take() {
        Some(mut stdin) => stdin.write_all(text.as_bytes()),
        None => Ok(()),
    };
    let waited = child.wait();

    written.map_err(|e| BdashError::clipboard(format!("Failed to write to {}: {}", program, e)))?;
    let status = waited.map_err(|e| BdashError::clipboard(format!("{} failed: {}", program, e)))?;
    if !status.success() {
        return Err(BdashError::clipboard(format!("{} exited with {}", program, status)));
    }
    Ok(())
}

/// Writes the OSC 52 "set clipboard" sequence: `ESC ] 52 ; c ; <base64> ESC \`.
fn write_osc52(out: &mut impl Write, text: &str) -> Result<()> {
    use base64::{engine::general_purpose::STANDARD, Engine};

    let sequence = format!("\x1b]52;c;{}\x1b\\", STANDARD.encode(text));
    out.write_all(sequence.as_bytes())
        .and_then(|_| out.flush())
        .map_err(|e| BdashError::clipboard(format!("Failed to write OSC 52: {}", e)))
}

/// In-memory clipboard; keeps every copy in order.
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    copies: Mutex<Vec<String>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent copy.
    pub fn last(&self) -> Option<String> {
        self.copies.lock().ok().and_then(|c| c.last().cloned())
    }

    pub fn copies(&self) -> Vec<String> {
        self.copies.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Clipboard for MemoryClipboard {
    fn write_text(&self, text: &str) -> Result<()> {
        self.copies
            .lock()
            .map_err(|_| BdashError::clipboard("Failed to acquire clipboard lock"))?
            .push(text.to_string());
        Ok(())
    }
}
