use std::fmt;

/// Index of one independently scheduled firing unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct TurretId(usize);

impl TurretId {
    #[must_use]
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn value(self) -> usize {
        self.0
    }
}

impl fmt::Display for TurretId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a physical gun on a turret. Workers alternate guns on
/// successive shots to balance barrel wear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct GunId(usize);

impl GunId {
    #[must_use]
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn value(self) -> usize {
        self.0
    }
}

impl fmt::Display for GunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
