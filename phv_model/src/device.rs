//! Opaque device facts, queried by the feasibility and overlay engines.

/// Target device description. Treated as facts: nothing in this core
/// derives or caches device properties beyond one call.
#[derive(Debug, Clone, Copy)]
pub struct Device {
    /// Number of match-action stages in the pipeline.
    pub stages: u16,
    /// Whether the device provides the Always-Run-Action primitive used
    /// for dark-overlay initialization outside of match actions.
    pub has_always_run_action: bool,
    /// Whether mocha/dark container kinds exist on this device.
    pub has_dark_containers: bool,
}

impl Device {
    /// A device with dark containers and ARA support.
    pub fn with_dark(stages: u16) -> Self {
        Self {
            stages,
            has_always_run_action: true,
            has_dark_containers: true,
        }
    }

    /// A device with only normal and tagalong containers.
    pub fn basic(stages: u16) -> Self {
        Self {
            stages,
            has_always_run_action: false,
            has_dark_containers: false,
        }
    }
}
