//! Pipeline lifecycle transition table
//!
//! ```text
//! CREATING -> ACTIVE | ERROR
//! ACTIVE   -> UPDATING | DELETING
//! UPDATING -> ACTIVE | ERROR
//! ERROR    -> DELETING
//! DELETING -> DELETING (operator retry) | DELETED
//! DELETED  -> (terminal)
//! ```
//!
//! ERROR is only left through deletion; a failed create is retried by
//! creating a new pipeline.

use crate::domain::pipeline::PipelineStatus;

impl PipelineStatus {
    pub fn can_transition_to(self, next: PipelineStatus) -> bool {
        use PipelineStatus::*;

        matches!(
            (self, next),
            (Creating, Active)
                | (Creating, Error)
                | (Active, Updating)
                | (Active, Deleting)
                | (Updating, Active)
                | (Updating, Error)
                | (Error, Deleting)
                | (Deleting, Deleting)
                | (Deleting, Deleted)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == PipelineStatus::Deleted
    }

    /// A provisioning run is in flight in this state
    pub fn is_provisioning(self) -> bool {
        matches!(self, PipelineStatus::Creating | PipelineStatus::Updating)
    }
}
