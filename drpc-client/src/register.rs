//! URL-scheme registration for join/spectate links.
//!
//! The host launches `discord-<client_id>://` links with the registered
//! command. On Linux this is an XDG desktop entry plus an `xdg-mime`
//! association; elsewhere only the scheme is returned.

use crate::error::ClientError;
use std::fmt::Write as FmtWrite;
use std::fs;
use std::path::{Path, PathBuf};

/// Returns the URL scheme the host uses for an application.
pub fn url_scheme(client_id: &str) -> String {
    format!("discord-{client_id}")
}

/// Registers the URL scheme for `client_id` and returns it.
///
/// `command` defaults to the current executable.
pub fn register(client_id: &str, command: Option<&str>) -> Result<String, ClientError> {
    let scheme = url_scheme(client_id);
    let command = match command {
        Some(command) => command.to_string(),
        None => std::env::current_exe()
            .map_err(|e| ClientError::Registration(format!("current executable: {e}")))?
            .display()
            .to_string(),
    };

    if cfg!(target_os = "linux") {
        let dir = applications_dir().ok_or_else(|| {
            ClientError::Registration("cannot locate the applications directory".to_string())
        })?;
        let path = write_desktop_entry(&dir, client_id, &command)?;
        associate_scheme(&path, &scheme);
    } else {
        tracing::debug!("No scheme registration on this platform; returning {}", scheme);
    }

    Ok(format!("{scheme}://"))
}

/// `$XDG_DATA_HOME/applications`, falling back to `~/.local/share/applications`.
fn applications_dir() -> Option<PathBuf> {
    let data_home = std::env::var_os("XDG_DATA_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| home::home_dir().map(|h| h.join(".local").join("share")))?;
    Some(data_home.join("applications"))
}

fn desktop_entry(client_id: &str, command: &str) -> String {
    let mut content = String::new();
    let _ = writeln!(content, "[Desktop Entry]");
    let _ = writeln!(content, "Name={client_id}");
    let _ = writeln!(content, "Exec={command} %u");
    let _ = writeln!(content, "Type=Application");
    let _ = writeln!(content, "NoDisplay=true");
    let _ = writeln!(content, "Categories=Discord;Games;");
    let _ = writeln!(content, "MimeType=x-scheme-handler/{};", url_scheme(client_id));
    content
}

/// Writes `discord-<id>.desktop` into `dir` and returns its path.
fn write_desktop_entry(dir: &Path, client_id: &str, command: &str) -> Result<PathBuf, ClientError> {
    fs::create_dir_all(dir).map_err(|e| {
        ClientError::Registration(format!("create {}: {e}", dir.display()))
    })?;

    let path = dir.join(format!("{}.desktop", url_scheme(client_id)));
    fs::write(&path, desktop_entry(client_id, command)).map_err(|e| {
        ClientError::Registration(format!("write {}: {e}", path.display()))
    })?;

    tracing::debug!("Wrote desktop entry to {:?}", path);
    Ok(path)
}

/// Makes the desktop entry the default handler. Failure only warns: the
/// entry alone is enough for most desktops.
fn associate_scheme(entry: &Path, scheme: &str) {
    let Some(file_name) = entry.file_name() else {
        return;
    };
    let status = std::process::Command::new("xdg-mime")
        .arg("default")
        .arg(file_name)
        .arg(format!("x-scheme-handler/{scheme}"))
        .status();

    match status {
        Ok(status) if status.success() => {}
        Ok(status) => tracing::warn!("xdg-mime exited with {}", status),
        Err(e) => tracing::warn!("Could not run xdg-mime: {}", e),
    }
}
