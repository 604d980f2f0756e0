// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;
use uuid::Uuid;

use crate::models::Phase;

/// Illegal session state machine transitions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("phase cannot move backwards from {from} to {to}")]
    Regression { from: Phase, to: Phase },

    #[error("phase cannot skip from {from} to {to}")]
    Skipped { from: Phase, to: Phase },

    #[error("phase {phase} still has {outstanding} non-terminal task(s)")]
    NotSettled { phase: Phase, outstanding: usize },

    #[error("session {0} is sealed")]
    Sealed(Uuid),
}
