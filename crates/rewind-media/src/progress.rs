//! Parsed `-progress pipe:2` key=value stream (§4.1).

use serde::{Deserialize, Serialize};

/// One emitted progress update. Mirrors the key=value lines ffmpeg writes to
/// its progress pipe; `state` reaches `"end"` exactly once, as the terminal
/// update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Progress {
    pub frame: u64,
    pub fps: f64,
    pub bitrate_str: String,
    pub total_size: u64,
    pub out_time_us: i64,
    pub speed_str: String,
    pub state: String,
}

impl Progress {
    pub fn is_terminal(&self) -> bool {
        self.state == "end"
    }

    pub fn speed(&self) -> Option<f64> {
        self.speed_str.strip_suffix('x').and_then(|s| s.parse().ok())
    }

    pub fn percentage(&self, total_duration_us: i64) -> f64 {
        if total_duration_us <= 0 {
            return 0.0;
        }
        ((self.out_time_us as f64 / total_duration_us as f64) * 100.0).clamp(0.0, 100.0)
    }

    pub fn eta_seconds(&self, total_duration_us: i64) -> Option<f64> {
        let speed = self.speed()?;
        if speed <= 0.0 || self.out_time_us <= 0 {
            return None;
        }
        let remaining_us = total_duration_us - self.out_time_us;
        if remaining_us <= 0 {
            return Some(0.0);
        }
        Some((remaining_us as f64 / 1_000_000.0) / speed)
    }
}

/// Callback invoked for every parsed progress update.
pub type ProgressSink = Box<dyn Fn(Progress) + Send + 'static>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_clamps_to_100() {
        let p = Progress {
            out_time_us: 20_000_000,
            ..Default::default()
        };
        assert_eq!(p.percentage(10_000_000), 100.0);
    }

    #[test]
    fn eta_uses_speed_and_remaining_time() {
        let p = Progress {
            out_time_us: 5_000_000,
            speed_str: "2.0x".to_string(),
            ..Default::default()
        };
        let eta = p.eta_seconds(10_000_000).unwrap();
        assert!((eta - 2.5).abs() < 0.01);
    }

    #[test]
    fn is_terminal_only_on_end_state() {
        let mut p = Progress::default();
        assert!(!p.is_terminal());
        p.state = "end".to_string();
        assert!(p.is_terminal());
    }
}
