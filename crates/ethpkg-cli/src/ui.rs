//! Terminal output

use crossterm::style::Stylize;

use ethpkg_core::{Event, Listener};

/// Prints core events to stderr.
#[derive(Debug, Clone, Copy)]
pub struct TerminalListener;

impl Listener for TerminalListener {
    fn on_event(&self, event: &Event) {
        match event {
            Event::ResolvingRelease { spec } => eprintln!("  {} {spec}", "resolving".dark_grey()),
            Event::DownloadProgress {
                current,
                total: Some(total),
                ..
            } if current == total => eprintln!("  {} {}", "downloaded".dark_grey(), format_size(*total)),
            Event::DownloadProgress { .. } => {}
            Event::ExtractProgress { path, current, total } => {
                eprintln!("  {} {path}", format!("[{current}/{total}]").dark_grey());
            }
            Event::Signing { address } => eprintln!("  {} as {address}", "signing".cyan()),
            Event::Signed { path } => eprintln!("  {} {path}", "wrote".green()),
            Event::Resolved { name, address } => {
                eprintln!("  {} {name} -> {address}", "resolved".dark_grey());
            }
            Event::Verifying { signatures } => {
                eprintln!("  {} {signatures} signature(s)", "checking".cyan());
            }
            Event::Verified { .. } => {}
        }
    }
}

/// Human-readable byte count.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(format_size(12), "12 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }
}
