//! Randomized pauses between loop iterations.

use std::fmt;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("pause bounds [{min}, {max}] are invalid: minimum must be at least 1s and not above maximum")]
pub struct InvalidPauseBounds {
	pub min: u64,
	pub max: u64,
}

/// Inclusive range of whole seconds to pause, with `1 <= min <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "[u64; 2]", into = "[u64; 2]")]
pub struct PauseBounds {
	min_secs: u64,
	max_secs: u64,
}

impl PauseBounds {
	/// Between consecutive ad views.
	pub const SHORT: Self = Self {
		min_secs: 1,
		max_secs: 4,
	};

	/// Sparser cadence used by the play-and-return flow.
	pub const LONG: Self = Self {
		min_secs: 1,
		max_secs: 40,
	};

	pub fn new(min_secs: u64, max_secs: u64) -> Result<Self, InvalidPauseBounds> {
		if min_secs == 0 || min_secs > max_secs {
			return Err(InvalidPauseBounds {
				min: min_secs,
				max: max_secs,
			});
		}
		Ok(Self { min_secs, max_secs })
	}

	pub fn min(&self) -> Duration {
		Duration::from_secs(self.min_secs)
	}

	pub fn max(&self) -> Duration {
		Duration::from_secs(self.max_secs)
	}

	pub fn contains(&self, pause: Duration) -> bool {
		(self.min()..=self.max()).contains(&pause)
	}

	/// Draws a whole-second pause uniformly from the bounds.
	pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
		Duration::from_secs(rng.gen_range(self.min_secs..=self.max_secs))
	}
}

impl TryFrom<[u64; 2]> for PauseBounds {
	type Error = InvalidPauseBounds;

	fn try_from([min, max]: [u64; 2]) -> Result<Self, Self::Error> {
		Self::new(min, max)
	}
}

impl From<PauseBounds> for [u64; 2] {
	fn from(bounds: PauseBounds) -> Self {
		[bounds.min_secs, bounds.max_secs]
	}
}

impl fmt::Display for PauseBounds {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}-{}s", self.min_secs, self.max_secs)
	}
}

/// Which configured pause range a variant draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PauseProfile {
	#[default]
	Short,
	Long,
}

impl PauseProfile {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Short => "short",
			Self::Long => "long",
		}
	}
}
