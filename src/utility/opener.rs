use anyhow::{Context, Result};
use std::ffi::{OsStr, OsString};
use std::process::{Command, Stdio};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Other
        }
    }
}

fn is_web_url(target: &OsStr) -> bool {
    let target = target.to_string_lossy().to_ascii_lowercase();
    target.starts_with("http://") || target.starts_with("https://")
}

/// Program and full argument list that open `target`
///
/// The target is always a single argument of its own. Nothing goes through
/// `cmd`, whose parser would split a query string at `&`.
pub fn viewer_command(
    target: &OsStr,
    explicit: Option<&str>,
    platform: Platform,
) -> (String, Vec<OsString>) {
    if let Some(cmd) = explicit {
        let mut parts = cmd.split_whitespace();
        if let Some(program) = parts.next() {
            let mut args: Vec<OsString> = parts.map(OsString::from).collect();
            args.push(target.to_os_string());
            return (program.to_string(), args);
        }
    }

    match platform {
        Platform::Windows if is_web_url(target) => (
            "rundll32".to_string(),
            vec![OsString::from("url.dll,FileProtocolHandler"), target.to_os_string()],
        ),
        Platform::Windows => ("explorer".to_string(), vec![target.to_os_string()]),
        Platform::MacOs => ("open".to_string(), vec![target.to_os_string()]),
        Platform::Other => ("xdg-open".to_string(), vec![target.to_os_string()]),
    }
}

/// Launch the viewer without waiting for it to exit
pub fn open_in_viewer(target: impl AsRef<OsStr>, explicit: Option<&str>) -> Result<()> {
    let target = target.as_ref();
    let (program, args) = viewer_command(target, explicit, Platform::current());

    info!(program = %program, target = %target.to_string_lossy(), "Opening viewer");

    Command::new(&program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("Failed to launch viewer '{}'", program))?;

    Ok(())
}
