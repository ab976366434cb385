use conductor_core::Mode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Boundary {
    Task,
    Story,
    Epic,
}

impl Boundary {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Story => "story",
            Self::Epic => "epic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    Pause,
    Continue { log: bool },
}

impl Checkpoint {
    pub fn is_pause(&self) -> bool {
        matches!(self, Self::Pause)
    }

    /// Whether the boundary is written to the session log.
    pub fn logs(&self) -> bool {
        matches!(self, Self::Pause | Self::Continue { log: true })
    }
}

/// What to do when `boundary` is reached in `mode`.
///
/// | Boundary | supervised | semi-auto      | autonomous          |
/// |----------|------------|----------------|---------------------|
/// | task     | pause      | continue (log) | continue (skip log) |
/// | story    | pause      | pause          | continue (log)      |
/// | epic     | pause      | pause          | pause               |
pub fn decide(mode: Mode, boundary: Boundary) -> Checkpoint {
    use Boundary::*;
    use Checkpoint::*;

    match (mode, boundary) {
        (Mode::Supervised, _) => Pause,
        (Mode::SemiAuto, Task) => Continue { log: true },
        (Mode::SemiAuto, Story | Epic) => Pause,
        (Mode::Autonomous, Task) => Continue { log: false },
        (Mode::Autonomous, Story) => Continue { log: true },
        (Mode::Autonomous, Epic) => Pause,
    }
}

/// Holds the session mode. The mode only changes between cycles, through
/// an explicit command.
#[derive(Debug, Clone, Copy)]
pub struct CheckpointController {
    mode: Mode,
}

impl CheckpointController {
    pub fn new(mode: Mode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn decide(&self, boundary: Boundary) -> Checkpoint {
        decide(self.mode, boundary)
    }

    /// The strongest boundary in `reached` that pauses, if any.
    pub fn first_pause(&self, reached: impl IntoIterator<Item = Boundary>) -> Option<Boundary> {
        reached
            .into_iter()
            .filter(|b| self.decide(*b).is_pause())
            .max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODES: [Mode; 3] = [Mode::Supervised, Mode::SemiAuto, Mode::Autonomous];

    #[test]
    fn test_autonomous_never_pauses_on_task_and_always_on_epic() {
        assert_eq!(
            decide(Mode::Autonomous, Boundary::Task),
            Checkpoint::Continue { log: false }
        );
        for mode in MODES {
            assert!(decide(mode, Boundary::Epic).is_pause());
        }
    }

    #[test]
    fn test_table() {
        assert!(decide(Mode::Supervised, Boundary::Task).is_pause());
        assert_eq!(
            decide(Mode::SemiAuto, Boundary::Task),
            Checkpoint::Continue { log: true }
        );
        assert!(decide(Mode::SemiAuto, Boundary::Story).is_pause());
        assert_eq!(
            decide(Mode::Autonomous, Boundary::Story),
            Checkpoint::Continue { log: true }
        );
    }

    #[test]
    fn test_logging() {
        assert!(!decide(Mode::Autonomous, Boundary::Task).logs());
        assert!(decide(Mode::SemiAuto, Boundary::Task).logs());
        assert!(decide(Mode::Supervised, Boundary::Story).logs());
    }

    #[test]
    fn test_first_pause_picks_strongest() {
        let ctl = CheckpointController::new(Mode::SemiAuto);
        assert_eq!(
            ctl.first_pause([Boundary::Task, Boundary::Story, Boundary::Task]),
            Some(Boundary::Story)
        );

        let ctl = CheckpointController::new(Mode::Autonomous);
        assert_eq!(ctl.first_pause([Boundary::Task, Boundary::Story]), None);
        assert_eq!(
            ctl.first_pause([Boundary::Story, Boundary::Epic]),
            Some(Boundary::Epic)
        );
    }
}
