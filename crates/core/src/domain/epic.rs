use serde::{Deserialize, Serialize};

use super::RollupStatus;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum EpicPriority {
    P0,
    P1,
    #[default]
    P2,
    P3,
}

impl EpicPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::P0 => "P0",
            Self::P1 => "P1",
            Self::P2 => "P2",
            Self::P3 => "P3",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "P0" => Some(Self::P0),
            "P1" => Some(Self::P1),
            "P2" => Some(Self::P2),
            "P3" => Some(Self::P3),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Epic {
    pub id: String,
    pub title: String,
    pub priority: EpicPriority,
    pub story_ids: Vec<String>,
    pub status: RollupStatus,
}

impl Epic {
    pub fn new(id: impl Into<String>, title: impl Into<String>, priority: EpicPriority) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            priority,
            story_ids: Vec::new(),
            status: RollupStatus::Todo,
        }
    }
}
