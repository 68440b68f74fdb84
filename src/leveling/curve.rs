//! Level curve.  Reaching level `n + 1` from level `n` costs `5n² + 50n + 100` experience.

/// Experience needed to advance from `level` to `level + 1`.
pub fn experience_required_for(level: u32) -> u64 {
    let level = u64::from(level);
    5 * level * level + 50 * level + 100
}

/// Total experience at which `level` is reached.
pub fn threshold(level: u32) -> u64 {
    (0..level).map(experience_required_for).sum()
}

/// Level reached with `experience` total experience.
pub fn level_from_experience(experience: u64) -> u32 {
    let mut remaining = experience;
    let mut level = 0;

    while remaining >= experience_required_for(level) {
        remaining -= experience_required_for(level);
        level += 1;
    }

    level
}

/// Where a user stands within their current level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress {
    pub level: u32,
    /// Experience earned since reaching `level`
    pub into_level: u64,
    /// Experience needed to go from `level` to `level + 1`
    pub needed: u64,
}

impl Progress {
    pub fn of(experience: u64) -> Self {
        let level = level_from_experience(experience);
        Self {
            level,
            into_level: experience - threshold(level),
            needed: experience_required_for(level),
        }
    }

    /// Fraction of the current level completed, in `[0, 1)`.
    pub fn ratio(&self) -> f64 {
        self.into_level as f64 / self.needed as f64
    }
}
