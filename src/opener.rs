use anyhow::{Context, Result, anyhow};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::info;

#[cfg(target_os = "macos")]
fn opener_command(url: &str) -> Command {
  let mut cmd = Command::new("open");
  cmd.arg(url);
  cmd
}

#[cfg(target_os = "windows")]
fn opener_command(url: &str) -> Command {
  let mut cmd = Command::new("cmd");
  cmd.args(["/C", "start", "", url]);
  cmd
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn opener_command(url: &str) -> Command {
  let mut cmd = Command::new("xdg-open");
  cmd.arg(url);
  cmd
}

/// Hand `url` to the platform's default handler (browser, FreeTube for `freetube://`).
/// Returns once the opener is spawned; it never waits for the viewer.
pub fn open_url(url: &str) -> Result<()> {
  if url.is_empty() {
    return Err(anyhow!("Nothing to open"));
  }
  let mut child = opener_command(url)
    .stdin(Stdio::null())
    .stdout(Stdio::null())
    .stderr(Stdio::null())
    .spawn()
    .with_context(|| format!("Failed to open {}", url))?;
  info!(url, "opened in external viewer");
  // Reap the child in a background thread to avoid zombie processes.
  std::thread::spawn(move || {
    let _ = child.wait();
  });
  Ok(())
}

/// OSC 52 "set clipboard" sequence for `text`.
pub fn osc52_sequence(text: &str) -> String {
  format!("\x1B]52;c;{}\x07", BASE64.encode(text))
}

/// Put `text` on the system clipboard through the terminal (OSC 52).
pub fn copy_to_clipboard(text: &str) -> Result<()> {
  let mut stdout = std::io::stdout();
  write!(stdout, "{}", osc52_sequence(text)).context("Failed to write clipboard sequence")?;
  stdout.flush().context("Failed to flush clipboard sequence")?;
  Ok(())
}
