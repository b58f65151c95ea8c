//! Behavior policy applied when an action detects a matching pre-existing
//! remote entity.

use gpf_common::{Config, GpfError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Fail the action.
    Stop,
    /// Delete the existing entity and recreate.
    Delete,
    /// Reuse the existing entity, failing if it is unstable.
    Continue,
    /// Reuse when healthy, recreate when the previous run failed.
    Resume,
}

impl Behavior {
    pub const ALLOWED: &'static str = "STOP|DELETE|CONTINUE|RESUME";

    pub fn parse(token: &str) -> Result<Self> {
        match token {
            "STOP" => Ok(Behavior::Stop),
            "DELETE" => Ok(Behavior::Delete),
            "CONTINUE" => Ok(Behavior::Continue),
            "RESUME" => Ok(Behavior::Resume),
            other => Err(GpfError::Sdk(format!(
                "Le comportement {other} n'est pas reconnu ({}), l'exécution de l'action n'est pas possible.",
                Self::ALLOWED
            ))),
        }
    }

    /// Default for a given config section (`behavior_if_exists`).
    pub fn from_config(config: &Config, section: &str) -> Result<Self> {
        Self::parse(&config.get_str(section, "behavior_if_exists")?)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Behavior::Stop => "STOP",
            Behavior::Delete => "DELETE",
            Behavior::Continue => "CONTINUE",
            Behavior::Resume => "RESUME",
        }
    }

    pub fn reuses_existing(&self) -> bool {
        matches!(self, Behavior::Continue | Behavior::Resume)
    }
}

impl std::fmt::Display for Behavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
