use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Point-in-time view of a running batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
    pub percent: u32,
    pub eta: Option<Duration>,
}

impl ProgressSnapshot {
    /// ETA is the running average per finished item times the items left.
    pub fn compute(completed: usize, total: usize, elapsed: Duration) -> Self {
        let percent = if total == 0 {
            100
        } else {
            ((completed.min(total) * 100) / total) as u32
        };
        let remaining = total.saturating_sub(completed);
        let eta = if completed == 0 {
            None
        } else {
            let avg = elapsed.as_secs_f64() / completed as f64;
            Some(Duration::from_secs_f64(avg * remaining as f64))
        };
        Self {
            completed,
            total,
            percent,
            eta,
        }
    }

    /// `5/20 - 25% - ETA: 45s`
    pub fn status_line(&self) -> String {
        let eta = self
            .eta
            .map(format_duration)
            .unwrap_or_else(|| "--".to_string());
        format!(
            "{}/{} - {}% - ETA: {}",
            self.completed, self.total, self.percent, eta
        )
    }
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64().round() as u64;
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_each_scale() {
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::from_secs(200)), "3m 20s");
        assert_eq!(format_duration(Duration::from_secs(7500)), "2h 5m");
        assert_eq!(format_duration(Duration::from_millis(400)), "0s");
    }

    #[test]
    fn no_eta_before_first_item() {
        let s = ProgressSnapshot::compute(0, 10, Duration::ZERO);
        assert_eq!(s.eta, None);
        assert_eq!(s.status_line(), "0/10 - 0% - ETA: --");
    }
}
