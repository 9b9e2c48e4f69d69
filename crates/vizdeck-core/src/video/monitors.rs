//! Display enumeration (fullscreen targets and refresh cadence)

use std::process::Command;

use serde::{Deserialize, Serialize};

/// A connected display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorInfo {
    pub index: usize,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub x: i32,
    pub y: i32,
    /// Active mode refresh rate in Hz, when known
    pub refresh_hz: Option<f32>,
    pub is_primary: bool,
}

impl MonitorInfo {
    fn fallback() -> Self {
        Self {
            index: 0,
            name: "Primary".to_string(),
            width: 1920,
            height: 1080,
            x: 0,
            y: 0,
            refresh_hz: Some(60.0),
            is_primary: true,
        }
    }
}

/// List connected monitors via `xrandr --query`
///
/// Falls back to a single 1920x1080@60 primary display when xrandr is
/// unavailable or reports nothing.
pub fn list_monitors() -> Vec<MonitorInfo> {
    let monitors = match Command::new("xrandr").arg("--query").output() {
        Ok(output) if output.status.success() => {
            parse_xrandr(&String::from_utf8_lossy(&output.stdout))
        }
        Ok(output) => {
            log::debug!("Video: xrandr exited with {}", output.status);
            Vec::new()
        }
        Err(e) => {
            log::debug!("Video: xrandr not available: {}", e);
            Vec::new()
        }
    };

    if monitors.is_empty() {
        vec![MonitorInfo::fallback()]
    } else {
        monitors
    }
}

/// Refresh rate of the primary (else first) monitor
pub fn primary_refresh_rate(monitors: &[MonitorInfo]) -> Option<f32> {
    monitors
        .iter()
        .find(|m| m.is_primary)
        .or_else(|| monitors.first())
        .and_then(|m| m.refresh_hz)
}

/// Parse `xrandr --query` output
///
/// ```text
/// HDMI-1 connected primary 1920x1080+0+0 (normal left inverted right) 527mm x 296mm
///    1920x1080     60.00*+  50.00    59.94
/// DP-1 connected 2560x1440+1920+0 (normal left inverted right) 597mm x 336mm
///    2560x1440    143.97*+ 120.00
/// ```
///
/// Connected outputs without an active mode (no geometry) are skipped.
pub fn parse_xrandr(output: &str) -> Vec<MonitorInfo> {
    let mut monitors: Vec<MonitorInfo> = Vec::new();
    // Whether mode lines currently belong to the last pushed monitor
    let mut in_monitor = false;

    for line in output.lines() {
        if line.starts_with(char::is_whitespace) {
            if in_monitor {
                if let Some(rate) = active_rate(line) {
                    if let Some(last) = monitors.last_mut() {
                        last.refresh_hz.get_or_insert(rate);
                    }
                }
            }
            continue;
        }

        in_monitor = false;
        let mut parts = line.split_whitespace();
        let (Some(name), Some("connected")) = (parts.next(), parts.next()) else {
            continue;
        };
        let rest: Vec<&str> = parts.collect();
        let is_primary = rest.first() == Some(&"primary");
        let Some((width, height, x, y)) = rest.iter().find_map(|part| parse_geometry(part)) else {
            continue;
        };

        monitors.push(MonitorInfo {
            index: monitors.len(),
            name: name.to_string(),
            width,
            height,
            x,
            y,
            refresh_hz: None,
            is_primary,
        });
        in_monitor = true;
    }

    monitors
}

/// `1920x1080+0+0` -> (1920, 1080, 0, 0)
fn parse_geometry(token: &str) -> Option<(u32, u32, i32, i32)> {
    let (size, offsets) = token.split_once('+')?;
    let (width, height) = size.split_once('x')?;
    let (x, y) = offsets.split_once('+')?;
    Some((width.parse().ok()?, height.parse().ok()?, x.parse().ok()?, y.parse().ok()?))
}

/// The rate marked `*` (current mode) on a mode line
fn active_rate(line: &str) -> Option<f32> {
    line.split_whitespace()
        .find(|token| token.contains('*'))
        .and_then(|token| token.trim_end_matches(['*', '+']).parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const XRANDR: &str = "\
Screen 0: minimum 320 x 200, current 4480 x 1440, maximum 16384 x 16384
eDP-1 connected 1920x1080+0+360 (normal left inverted right x axis y axis) 344mm x 194mm
   1920x1080     60.01 +  59.93*
   1680x1050     59.88
HDMI-1 disconnected (normal left inverted right x axis y axis)
DP-1 connected primary 2560x1440+1920+0 (normal left inverted right x axis y axis) 597mm x 336mm
   2560x1440    143.97*+ 120.00    59.95
DP-2 connected (normal left inverted right x axis y axis)
   1920x1080     60.00 +
";

    #[test]
    fn test_parse_connected_outputs() {
        let monitors = parse_xrandr(XRANDR);
        assert_eq!(monitors.len(), 2);

        assert_eq!(monitors[0].name, "eDP-1");
        assert_eq!((monitors[0].width, monitors[0].height), (1920, 1080));
        assert_eq!((monitors[0].x, monitors[0].y), (0, 360));
        assert_eq!(monitors[0].refresh_hz, Some(59.93));
        assert!(!monitors[0].is_primary);

        assert_eq!(monitors[1].index, 1);
        assert_eq!(monitors[1].name, "DP-1");
        assert!(monitors[1].is_primary);
        assert_eq!(monitors[1].refresh_hz, Some(143.97));
    }

    #[test]
    fn test_primary_refresh_rate() {
        let monitors = parse_xrandr(XRANDR);
        assert_eq!(primary_refresh_rate(&monitors), Some(143.97));
        assert_eq!(primary_refresh_rate(&[]), None);
    }

    #[test]
    fn test_list_monitors_never_empty() {
        assert!(!list_monitors().is_empty());
    }

    #[test]
    fn test_geometry_rejects_modes_without_offsets() {
        assert_eq!(parse_geometry("1920x1080"), None);
        assert_eq!(parse_geometry("800x600+10+20"), Some((800, 600, 10, 20)));
    }
}
