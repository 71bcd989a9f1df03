use serde::{Deserialize, Serialize};

/// Stream lifecycle. `Failed` is entered by the worker when consecutive
/// delivery failures trip the breaker; only an explicit enable leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    Inactive,
    Active,
    Paused,
    Failed,
}

impl StreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamStatus::Inactive => "inactive",
            StreamStatus::Active => "active",
            StreamStatus::Paused => "paused",
            StreamStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inactive" => Some(StreamStatus::Inactive),
            "active" => Some(StreamStatus::Active),
            "paused" => Some(StreamStatus::Paused),
            "failed" => Some(StreamStatus::Failed),
            _ => None,
        }
    }
}

/// Operator-initiated state operations. The worker-triggered trip to
/// `failed` is not an action: it bypasses this table by design of the
/// breaker (active → failed only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamAction {
    Enable,
    Disable,
    Pause,
    Resume,
}

impl StreamAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamAction::Enable => "enable",
            StreamAction::Disable => "disable",
            StreamAction::Pause => "pause",
            StreamAction::Resume => "resume",
        }
    }
}

/// Apply an operator action to a status. `None` means the transition is not
/// in the allowed set and callers must surface `VALIDATION_ERROR`.
pub fn apply_action(status: StreamStatus, action: StreamAction) -> Option<StreamStatus> {
    match (action, status) {
        (StreamAction::Enable, StreamStatus::Inactive | StreamStatus::Failed) => {
            Some(StreamStatus::Active)
        }
        (StreamAction::Disable, _) => Some(StreamStatus::Inactive),
        (StreamAction::Pause, StreamStatus::Active) => Some(StreamStatus::Paused),
        (StreamAction::Resume, StreamStatus::Paused) => Some(StreamStatus::Active),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Success,
    Failed,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOutcome::Success => "success",
            DeliveryOutcome::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(DeliveryOutcome::Success),
            "failed" => Some(DeliveryOutcome::Failed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table_matches_status_machine() {
        use StreamAction::*;
        use StreamStatus::*;

        // enable: inactive|failed -> active
        assert_eq!(apply_action(Inactive, Enable), Some(Active));
        assert_eq!(apply_action(Failed, Enable), Some(Active));
        assert_eq!(apply_action(Active, Enable), None);
        assert_eq!(apply_action(Paused, Enable), None);

        // disable: any -> inactive
        for s in [Inactive, Active, Paused, Failed] {
            assert_eq!(apply_action(s, Disable), Some(Inactive));
        }

        // pause: active -> paused
        assert_eq!(apply_action(Active, Pause), Some(Paused));
        assert_eq!(apply_action(Paused, Pause), None);
        assert_eq!(apply_action(Failed, Pause), None);

        // resume: paused -> active
        assert_eq!(apply_action(Paused, Resume), Some(Active));
        assert_eq!(apply_action(Active, Resume), None);
        assert_eq!(apply_action(Inactive, Resume), None);
    }
}
