use std::fmt;

use serde::{Deserialize, Serialize};

/// External order lifecycle vocabulary. This is the contract boundary: the
/// backend keeps a finer-grained internal vocabulary that collapses onto
/// these six values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Placed,
    Queued,
    EnRoute,
    Arrived,
    Delivered,
    Cancelled,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Placed,
        Stage::Queued,
        Stage::EnRoute,
        Stage::Arrived,
        Stage::Delivered,
        Stage::Cancelled,
    ];

    /// Terminal stages have no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Delivered | Stage::Cancelled)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Placed => "placed",
            Stage::Queued => "queued",
            Stage::EnRoute => "en-route",
            Stage::Arrived => "arrived",
            Stage::Delivered => "delivered",
            Stage::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// The backend's internal stage vocabulary as seen on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BackendStage {
    Pending,
    Confirmed,
    Preparing,
    Ready,
    PickedUp,
    Delivering,
    Arrived,
    Delivered,
    Cancelled,
}

/// Total, many-to-one collapse of the backend vocabulary onto the six
/// external stages.
pub fn to_external(internal: BackendStage) -> Stage {
    match internal {
        BackendStage::Pending => Stage::Placed,
        BackendStage::Confirmed | BackendStage::Preparing => Stage::Queued,
        BackendStage::Ready | BackendStage::PickedUp | BackendStage::Delivering => Stage::EnRoute,
        BackendStage::Arrived => Stage::Arrived,
        BackendStage::Delivered => Stage::Delivered,
        BackendStage::Cancelled => Stage::Cancelled,
    }
}

/// Canonical backend representative for each external stage. Used only
/// when constructing a transition request; inverse of `to_external`
/// restricted to canonical forms.
pub fn to_internal(external: Stage) -> BackendStage {
    match external {
        Stage::Placed => BackendStage::Pending,
        Stage::Queued => BackendStage::Confirmed,
        Stage::EnRoute => BackendStage::Delivering,
        Stage::Arrived => BackendStage::Arrived,
        Stage::Delivered => BackendStage::Delivered,
        Stage::Cancelled => BackendStage::Cancelled,
    }
}

/// Transition table for the external lifecycle:
/// placed→queued, queued→en-route (accept), en-route→arrived→delivered
/// strictly sequential, anything non-terminal →cancelled. Delivered and
/// cancelled are terminal.
pub fn is_valid_transition(from: Stage, to: Stage) -> bool {
    use Stage::*;

    match (from, to) {
        (Delivered, _) | (Cancelled, _) => false,
        (Placed, Queued) => true,
        (Queued, EnRoute) => true,
        (EnRoute, Arrived) => true,
        (Arrived, Delivered) => true,
        (_, Cancelled) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected(from: Stage, to: Stage) -> bool {
        use Stage::*;
        matches!(
            (from, to),
            (Placed, Queued)
                | (Queued, EnRoute)
                | (EnRoute, Arrived)
                | (Arrived, Delivered)
                | (Placed, Cancelled)
                | (Queued, Cancelled)
                | (EnRoute, Cancelled)
                | (Arrived, Cancelled)
        )
    }

    #[test]
    fn transition_table_matches_lifecycle_exactly() {
        for from in Stage::ALL {
            for to in Stage::ALL {
                assert_eq!(
                    is_valid_transition(from, to),
                    expected(from, to),
                    "unexpected verdict for {from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn terminal_stages_have_no_outgoing_transitions() {
        for to in Stage::ALL {
            assert!(!is_valid_transition(Stage::Delivered, to));
            assert!(!is_valid_transition(Stage::Cancelled, to));
        }
    }

    #[test]
    fn self_transitions_are_invalid() {
        for stage in Stage::ALL {
            assert!(!is_valid_transition(stage, stage));
        }
    }

    #[test]
    fn external_round_trips_through_canonical_internal() {
        for stage in Stage::ALL {
            assert_eq!(to_external(to_internal(stage)), stage);
        }
    }

    #[test]
    fn backend_substates_collapse_many_to_one() {
        assert_eq!(to_external(BackendStage::Confirmed), Stage::Queued);
        assert_eq!(to_external(BackendStage::Preparing), Stage::Queued);
        assert_eq!(to_external(BackendStage::Ready), Stage::EnRoute);
        assert_eq!(to_external(BackendStage::PickedUp), Stage::EnRoute);
        assert_eq!(to_external(BackendStage::Delivering), Stage::EnRoute);
    }

    #[test]
    fn stage_serializes_in_kebab_case() {
        let json = serde_json::to_string(&Stage::EnRoute).unwrap();
        assert_eq!(json, "\"en-route\"");
        let parsed: Stage = serde_json::from_str("\"en-route\"").unwrap();
        assert_eq!(parsed, Stage::EnRoute);
    }
}
