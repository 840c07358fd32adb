#![forbid(unsafe_code)]

use glyco_kernel_contracts::axis::Axis;
use glyco_kernel_contracts::tick::SettingsFingerprint;
use tracing::info;

/// Remembers the last reported value of each learning-relevant setting and
/// reports which axis has to forget its evidence when one of them changes.
///
/// A key reported as `None` keeps its previous value. The first value seen for
/// a key only establishes the baseline.
#[derive(Debug, Clone, Default)]
pub struct SettingsWatch {
    last: SettingsFingerprint,
}

impl SettingsWatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_seen(&self) -> &SettingsFingerprint {
        &self.last
    }

    /// Adopts a previously saved fingerprint as the baseline, so a change made
    /// while the process was down is still noticed on the next tick.
    pub fn seed(&mut self, saved: &SettingsFingerprint) {
        self.last = saved.clone();
    }

    pub fn observe(&mut self, current: &SettingsFingerprint) -> Vec<Axis> {
        let mut changed = Vec::new();
        for (axis, key, last, now) in [
            (Axis::Height, "profile", &mut self.last.profile, &current.profile),
            (
                Axis::Timing,
                "meal_detect_speed",
                &mut self.last.meal_detect_speed,
                &current.meal_detect_speed,
            ),
            (
                Axis::Persistence,
                "correction_style",
                &mut self.last.correction_style,
                &current.correction_style,
            ),
        ] {
            let Some(value) = now else {
                continue;
            };
            match last.as_deref() {
                Some(previous) if previous != value.as_str() => {
                    info!(
                        key,
                        from = previous,
                        to = value.as_str(),
                        axis = axis.as_str(),
                        "setting changed"
                    );
                    changed.push(axis);
                }
                _ => {}
            }
            *last = Some(value.clone());
        }
        changed
    }
}
