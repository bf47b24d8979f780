use std::fmt;

/// Where a slot is in its synchronization cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SyncPhase {
    /// Texture matches content.
    #[default]
    Idle,
    /// Content changed; waiting for the quiescence window to pass.
    Dirty,
    /// Loading and tinting layers whose key changed.
    Processing,
    /// Rasterizing and uploading.
    Compositing,
    /// The last pass failed; the previous texture stays until the next edit is synchronized.
    Failed,
}

/// Inputs of the per-slot state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SyncEvent {
    /// A mutation bumped the content revision.
    Edited,
    /// No edit arrived during the debounce window.
    QuiescenceElapsed,
    /// Every layer has a current processed entry (ready or failed).
    LayersReady,
    /// The texture was committed (or elided, or cleared).
    Composited,
    /// The content moved on while processing or compositing.
    Superseded,
    /// Compositing or upload failed; the previous texture stays.
    Failed,
    /// Nothing to do.
    Clean,
}

impl SyncPhase {
    /// Transition function. Events that do not apply in the current phase leave it unchanged.
    ///
    /// Edits during `Processing`/`Compositing` do not interrupt the step; the step reports
    /// [`SyncEvent::Superseded`] when it notices and the slot goes back to `Dirty`.
    pub fn next(self, event: SyncEvent) -> SyncPhase {
        use SyncEvent as E;
        use SyncPhase as P;
        match (self, event) {
            (_, E::Clean) => P::Idle,
            (P::Idle | P::Failed, E::Edited) => P::Dirty,
            (P::Dirty, E::QuiescenceElapsed) => P::Processing,
            (P::Processing, E::LayersReady) => P::Compositing,
            (P::Compositing, E::Composited) => P::Idle,
            (P::Processing | P::Compositing, E::Superseded) => P::Dirty,
            (P::Processing | P::Compositing, E::Failed) => P::Failed,
            (p, _) => p,
        }
    }

    /// Return `true` while a pass is running.
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Processing | Self::Compositing)
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Dirty => "dirty",
            Self::Processing => "processing",
            Self::Compositing => "compositing",
            Self::Failed => "failed",
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/sync/phase.rs"]
mod tests;
