//! Model-lifecycle state machine.

use std::fmt;
use std::sync::Arc;

use crate::runtime::ModelHandle;

/// Exactly one of these holds at any time. Only the session manager moves
/// between them, through [`SessionState::transition`].
#[derive(Clone, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Loading {
        fraction: f64,
    },
    Loaded {
        handle: Arc<dyn ModelHandle>,
    },
}

/// Inputs to the state machine.
pub enum SessionEvent {
    BeginLoad,
    Progress(f64),
    Loaded(Arc<dyn ModelHandle>),
    Failed,
    Reset,
}

impl SessionState {
    /// Returns the next state, or `None` when `event` is not valid from here.
    ///
    /// `Reset` is accepted from every state. A load may start from `Idle` or
    /// replace a `Loaded` model, never from `Loading`.
    pub fn transition(&self, event: SessionEvent) -> Option<SessionState> {
        match (self, event) {
            (_, SessionEvent::Reset) => Some(SessionState::Idle),
            (SessionState::Idle | SessionState::Loaded { .. }, SessionEvent::BeginLoad) => {
                Some(SessionState::Loading { fraction: 0.0 })
            }
            (SessionState::Loading { .. }, SessionEvent::Progress(fraction)) => {
                Some(SessionState::Loading {
                    fraction: fraction.clamp(0.0, 1.0),
                })
            }
            (SessionState::Loading { .. }, SessionEvent::Loaded(handle)) => {
                Some(SessionState::Loaded { handle })
            }
            (SessionState::Loading { .. }, SessionEvent::Failed) => Some(SessionState::Idle),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Loading { .. } => "loading",
            SessionState::Loaded { .. } => "loaded",
        }
    }

    pub fn fraction(&self) -> f64 {
        match self {
            SessionState::Idle => 0.0,
            SessionState::Loading { fraction } => *fraction,
            SessionState::Loaded { .. } => 1.0,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, SessionState::Loading { .. })
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, SessionState::Loaded { .. })
    }

    /// The loaded handle, if it belongs to `model_id`.
    pub fn handle_for(&self, model_id: &str) -> Option<Arc<dyn ModelHandle>> {
        match self {
            SessionState::Loaded { handle } if handle.model_id() == model_id => {
                Some(Arc::clone(handle))
            }
            _ => None,
        }
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Loading { fraction } => {
                f.debug_struct("Loading").field("fraction", fraction).finish()
            }
            SessionState::Loaded { handle } => f
                .debug_struct("Loaded")
                .field("model_id", &handle.model_id())
                .finish(),
        }
    }
}
