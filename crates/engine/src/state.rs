use std::fmt;

/// Which artifacts the engine ended up serving from. Decided once, at load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    /// No metadata; a pre-ensemble single classifier with synthesized defaults.
    LegacySingleModel,
    /// Primary and secondary both loaded and both contribute.
    EnsembleFull,
    /// The metadata itself declares the secondary unavailable.
    EnsemblePrimaryOnly,
    /// The metadata declares a secondary, but it (or its scaler) failed to load.
    EnsembleDegraded { reason: String },
}

impl EngineState {
    pub fn uses_secondary(&self) -> bool {
        matches!(self, EngineState::EnsembleFull)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::LegacySingleModel => write!(f, "legacy single model"),
            EngineState::EnsembleFull => write!(f, "ensemble (primary + secondary)"),
            EngineState::EnsemblePrimaryOnly => write!(f, "ensemble (primary only)"),
            EngineState::EnsembleDegraded { reason } => {
                write!(f, "ensemble degraded to primary only: {reason}")
            }
        }
    }
}
