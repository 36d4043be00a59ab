//! Deterministic per-device port assignment.
//!
//! A device's ordinal (its position in discovery order) maps to:
//!
//! ```text
//! server_port  = base_port    + ordinal * stride
//! control_port = control_base + ordinal
//! ```
//!
//! Assignment is a pure function of the [`PortPlan`] and the ordinal, so the
//! same device position gets the same ports on every run.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Ports handed to one device for the lifetime of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortAssignment {
	pub ordinal: u16,
	/// Port the device's automation server listens on.
	pub server_port: u16,
	/// Secondary control port forwarded to the device instrumentation.
	pub control_port: u16,
}

/// Fixed port-allocation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortPlan {
	pub base_port: u16,
	pub stride: u16,
	pub control_base: u16,
}

impl Default for PortPlan {
	fn default() -> Self {
		Self {
			base_port: 4723,
			stride: 2,
			control_base: 8200,
		}
	}
}

impl PortPlan {
	pub fn new(base_port: u16, stride: u16, control_base: u16) -> Self {
		Self {
			base_port,
			stride,
			control_base,
		}
	}

	/// Number of ordinals that fit below `u16::MAX` on both port ranges.
	pub fn capacity(&self) -> usize {
		if self.stride == 0 {
			return 0;
		}
		let server = (u16::MAX - self.base_port) as usize / self.stride as usize + 1;
		let control = (u16::MAX - self.control_base) as usize + 1;
		server.min(control).min(u16::MAX as usize)
	}

	/// Ports for `ordinal`.
	///
	/// Callers stay below [`capacity`](Self::capacity); [`assign_all`](Self::assign_all)
	/// checks that before handing out any assignment.
	pub fn assign(&self, ordinal: u16) -> PortAssignment {
		debug_assert!((ordinal as usize) < self.capacity());
		PortAssignment {
			ordinal,
			server_port: self
				.base_port
				.saturating_add(ordinal.saturating_mul(self.stride)),
			control_port: self.control_base.saturating_add(ordinal),
		}
	}

	/// Assignments for ordinals `0..count`.
	///
	/// # Errors
	///
	/// Returns [`Error::PortPlan`] when the plan cannot give `count` devices
	/// pairwise-distinct ports, or when the server and control ranges overlap.
	pub fn assign_all(&self, count: usize) -> Result<Vec<PortAssignment>> {
		self.validate(count)?;
		Ok((0..count as u16).map(|ordinal| self.assign(ordinal)).collect())
	}

	/// Checks that `count` devices can be served without any port collision.
	///
	/// # Errors
	///
	/// See [`assign_all`](Self::assign_all).
	pub fn validate(&self, count: usize) -> Result<()> {
		if self.stride == 0 {
			return Err(Error::PortPlan("port stride must be at least 1".into()));
		}
		if count > self.capacity() {
			return Err(Error::PortPlan(format!(
				"{count} devices exceed plan capacity of {} (base {}, stride {}, control base {})",
				self.capacity(),
				self.base_port,
				self.stride,
				self.control_base
			)));
		}
		if count == 0 {
			return Ok(());
		}

		let last = self.assign((count - 1) as u16);
		let control_range = self.control_base..=last.control_port;
		let server_hit = (0..count as u16)
			.map(|ordinal| self.assign(ordinal).server_port)
			.find(|port| control_range.contains(port));
		if let Some(port) = server_hit {
			return Err(Error::PortPlan(format!(
				"server port {port} falls inside control port range {}..={}",
				control_range.start(),
				control_range.end()
			)));
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashSet;

	use super::*;

	#[test]
	fn test_default_plan_matches_known_layout() {
		let plan = PortPlan::default();
		let assignments = plan.assign_all(3).unwrap();
		let ports: Vec<_> = assignments
			.iter()
			.map(|a| (a.ordinal, a.server_port, a.control_port))
			.collect();
		assert_eq!(ports, vec![(0, 4723, 8200), (1, 4725, 8201), (2, 4727, 8202)]);
	}

	#[test]
	fn test_assignments_are_pairwise_distinct() {
		let plan = PortPlan::default();
		for count in [1usize, 2, 7, 32] {
			let assignments = plan.assign_all(count).unwrap();
			assert_eq!(assignments.len(), count);

			let servers: HashSet<_> = assignments.iter().map(|a| a.server_port).collect();
			let controls: HashSet<_> = assignments.iter().map(|a| a.control_port).collect();
			assert_eq!(servers.len(), count);
			assert_eq!(controls.len(), count);
		}
	}

	#[test]
	fn test_assign_is_pure() {
		let plan = PortPlan::new(5000, 3, 9000);
		for ordinal in 0..16 {
			assert_eq!(plan.assign(ordinal), plan.assign(ordinal));
		}
		assert_eq!(plan.assign(4).server_port, 5012);
		assert_eq!(plan.assign(4).control_port, 9004);
	}

	#[test]
	fn test_zero_stride_is_rejected() {
		let plan = PortPlan::new(4723, 0, 8200);
		assert!(matches!(plan.assign_all(2), Err(Error::PortPlan(_))));
		assert_eq!(plan.capacity(), 0);
	}

	#[test]
	fn test_capacity_limits_assignment() {
		let plan = PortPlan::new(65530, 2, 8200);
		assert_eq!(plan.capacity(), 3);
		assert!(plan.assign_all(3).is_ok());
		assert!(matches!(plan.assign_all(4), Err(Error::PortPlan(_))));
	}

	#[test]
	fn test_overlapping_ranges_are_rejected() {
		// Server ports 8200, 8201, ... collide with control ports 8200, 8201, ...
		let plan = PortPlan::new(8200, 1, 8200);
		assert!(matches!(plan.validate(2), Err(Error::PortPlan(_))));

		// Server range sits entirely below the control range.
		let plan = PortPlan::new(4723, 2, 4800);
		assert!(plan.validate(10).is_ok());
		assert!(matches!(plan.validate(40), Err(Error::PortPlan(_))));
	}

	#[test]
	fn test_zero_devices_is_valid() {
		assert!(PortPlan::default().assign_all(0).unwrap().is_empty());
	}
}
