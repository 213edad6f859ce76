use serde::{Deserialize, Serialize};

/// Closed tagged variant replacing runtime scan-type string tests
/// (Design Notes §9, "Dynamic dispatch on scan type").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanKind {
    Intraoral,
    Face,
    Cbct,
}

/// The (source, target) modality pair a profile is keyed on (§3 Profile table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModalityPair {
    pub source: ScanKind,
    pub target: ScanKind,
}

impl ModalityPair {
    pub fn new(source: ScanKind, target: ScanKind) -> Self {
        Self { source, target }
    }
}
