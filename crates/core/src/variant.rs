//! Loop variants: the data that parameterizes one interaction loop.
//!
//! Every variant runs the same state machine. They differ in which elements
//! the primary step taps, how content is scrolled, how the ad surface is
//! triggered, how long the loop dwells afterwards and which pause range it
//! draws from.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use adcycle_protocol::Selector;
use serde::{Deserialize, Serialize};

use crate::pause::PauseProfile;

/// One tap of the primary step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryTap {
	pub target: Selector,
	/// Tap the last of all matches instead of waiting for the first.
	#[serde(default)]
	pub last_match: bool,
	#[serde(default)]
	pub timeout_ms: u64,
	/// Delay after a successful tap.
	#[serde(default)]
	pub settle_ms: u64,
}

impl PrimaryTap {
	fn wait_for(target: Selector, timeout_ms: u64, settle_ms: u64) -> Self {
		Self {
			target,
			last_match: false,
			timeout_ms,
			settle_ms,
		}
	}

	fn last(target: Selector, settle_ms: u64) -> Self {
		Self {
			target,
			last_match: true,
			timeout_ms: 0,
			settle_ms,
		}
	}

	pub fn timeout(&self) -> Duration {
		Duration::from_millis(self.timeout_ms)
	}

	pub fn settle(&self) -> Duration {
		Duration::from_millis(self.settle_ms)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ScrollStep {
	None,
	/// Fling the first scrollable container to its end.
	#[serde(rename_all = "camelCase")]
	ToEnd { max_swipes: u32 },
	/// Scroll until an element with `text` is visible.
	IntoView { text: String },
}

impl ScrollStep {
	/// Scrolling selector for this step, if any.
	pub fn selector(&self) -> Option<Selector> {
		match self {
			Self::None => None,
			Self::ToEnd { max_swipes } => Some(Selector::scroll_to_end(*max_swipes)),
			Self::IntoView { text } => Some(Selector::scroll_into_view(text)),
		}
	}
}

/// How the ad surface is activated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TriggerStrategy {
	/// Gesture tap at a point derived from the current viewport.
	#[serde(rename_all = "camelCase")]
	ViewportTap {
		/// Horizontal position as a fraction of the width.
		x_ratio: f64,
		/// Distance from the bottom edge in pixels.
		bottom_offset: u32,
	},
	/// Wait for a native element and click it.
	#[serde(rename_all = "camelCase")]
	Element { target: Selector, timeout_ms: u64 },
	/// Enter the first embedded web context and click the first candidate that
	/// resolves. The native context is restored afterwards.
	#[serde(rename_all = "camelCase")]
	WebContent {
		candidates: Vec<Selector>,
		per_candidate_timeout_ms: u64,
	},
}

impl TriggerStrategy {
	pub fn name(&self) -> &'static str {
		match self {
			Self::ViewportTap { .. } => "viewport-tap",
			Self::Element { .. } => "element",
			Self::WebContent { .. } => "web-content",
		}
	}
}

/// Tap point for [`TriggerStrategy::ViewportTap`], clamped to the viewport.
pub fn viewport_tap_point(width: u32, height: u32, x_ratio: f64, bottom_offset: u32) -> (u32, u32) {
	let x = (f64::from(width) * x_ratio.clamp(0.0, 1.0)) as u32;
	let x = x.min(width.saturating_sub(1));
	let y = height.saturating_sub(bottom_offset).min(height.saturating_sub(1));
	(x, y)
}

/// Wait after the trigger step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Dwell {
	Fixed { ms: u64 },
	/// Uniform over `min_ms..=max_ms`.
	#[serde(rename_all = "camelCase")]
	Random { min_ms: u64, max_ms: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelaunchStep {
	/// Between terminating and re-activating the app.
	pub gap_ms: u64,
	/// After re-activation, before the pause.
	#[serde(default)]
	pub reload_ms: u64,
}

/// Full parameterization of an interaction loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopVariant {
	pub name: String,
	/// Taps of the primary step, in order. The step stops at the first miss.
	pub primary: Vec<PrimaryTap>,
	pub scroll: ScrollStep,
	pub trigger: TriggerStrategy,
	pub dwell: Dwell,
	pub relaunch: RelaunchStep,
	#[serde(default)]
	pub pause: PauseProfile,
}

impl LoopVariant {
	/// Checks values serde cannot.
	pub fn validate(&self) -> Result<(), String> {
		if self.name.trim().is_empty() {
			return Err("variant name is empty".into());
		}
		if let Dwell::Random { min_ms, max_ms } = self.dwell {
			if min_ms > max_ms {
				return Err(format!("dwell range {min_ms}..={max_ms}ms is inverted"));
			}
		}
		match &self.trigger {
			TriggerStrategy::ViewportTap { x_ratio, .. } if !(0.0..=1.0).contains(x_ratio) => {
				Err(format!("viewport tap ratio {x_ratio} is outside 0..=1"))
			}
			TriggerStrategy::WebContent { candidates, .. } if candidates.is_empty() => {
				Err("web-content trigger needs at least one candidate selector".into())
			}
			_ => Ok(()),
		}
	}
}

const APP_ID: &str = "com.basketballshots.app";

/// Built-in variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VariantKind {
	/// Start a game, return to the menu and sit through a full-screen ad.
	PlayAndReturn,
	/// Tap the bottom banner by coordinates.
	#[default]
	BannerTap,
	/// Click the banner view by resource id.
	BannerElement,
	/// Click an ad inside embedded web content.
	WebContent,
}

impl VariantKind {
	pub const ALL: [Self; 4] = [
		Self::PlayAndReturn,
		Self::BannerTap,
		Self::BannerElement,
		Self::WebContent,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::PlayAndReturn => "play-and-return",
			Self::BannerTap => "banner-tap",
			Self::BannerElement => "banner-element",
			Self::WebContent => "web-content",
		}
	}

	pub fn preset(self) -> LoopVariant {
		let change_teams = |timeout_ms| {
			vec![PrimaryTap::wait_for(
				Selector::button_text("Change Teams"),
				timeout_ms,
				0,
			)]
		};
		let scroll_to_end = ScrollStep::ToEnd { max_swipes: 5 };

		let (primary, scroll, trigger, dwell, relaunch, pause) = match self {
			Self::PlayAndReturn => (
				vec![
					PrimaryTap::wait_for(Selector::button_text("Play"), 30_000, 5_000),
					PrimaryTap::last(Selector::class_name("android.widget.Button"), 2_000),
				],
				ScrollStep::IntoView {
					text: "Return to Menu".into(),
				},
				TriggerStrategy::Element {
					target: Selector::button_text("Return to Menu"),
					timeout_ms: 20_000,
				},
				Dwell::Fixed { ms: 30_000 },
				RelaunchStep {
					gap_ms: 2_000,
					reload_ms: 5_000,
				},
				PauseProfile::Long,
			),
			Self::BannerTap => (
				change_teams(20_000),
				scroll_to_end,
				TriggerStrategy::ViewportTap {
					x_ratio: 0.5,
					bottom_offset: 20,
				},
				Dwell::Fixed { ms: 2_000 },
				RelaunchStep {
					gap_ms: 1_000,
					reload_ms: 0,
				},
				PauseProfile::Short,
			),
			Self::BannerElement => (
				change_teams(30_000),
				scroll_to_end,
				TriggerStrategy::Element {
					target: Selector::id(format!("{APP_ID}:id/bannerAd")),
					timeout_ms: 20_000,
				},
				Dwell::Fixed { ms: 2_000 },
				RelaunchStep {
					gap_ms: 1_000,
					reload_ms: 0,
				},
				PauseProfile::Short,
			),
			Self::WebContent => (
				change_teams(20_000),
				scroll_to_end,
				TriggerStrategy::WebContent {
					candidates: vec![
						Selector::css("ins.adsbygoogle"),
						Selector::css("iframe[src*='ad']"),
						Selector::css("div[class*='ad']"),
						Selector::xpath("//iframe"),
						Selector::xpath("//*[contains(@class,'ad')]"),
					],
					per_candidate_timeout_ms: 5_000,
				},
				Dwell::Random {
					min_ms: 2_000,
					max_ms: 5_000,
				},
				RelaunchStep {
					gap_ms: 1_000,
					reload_ms: 0,
				},
				PauseProfile::Short,
			),
		};

		LoopVariant {
			name: self.as_str().to_string(),
			primary,
			scroll,
			trigger,
			dwell,
			relaunch,
			pause,
		}
	}
}

impl fmt::Display for VariantKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for VariantKind {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::ALL
			.into_iter()
			.find(|kind| kind.as_str() == s)
			.ok_or_else(|| {
				let known: Vec<_> = Self::ALL.iter().map(|k| k.as_str()).collect();
				format!("unknown variant '{s}' (expected one of: {})", known.join(", "))
			})
	}
}

#[cfg(test)]
mod tests {
	use adcycle_protocol::Strategy;

	use super::*;

	#[test]
	fn presets_are_valid_and_named() {
		for kind in VariantKind::ALL {
			let variant = kind.preset();
			assert_eq!(variant.name, kind.as_str());
			variant.validate().unwrap();
			assert_eq!(kind.as_str().parse::<VariantKind>().unwrap(), kind);
		}
	}

	#[test]
	fn presets_cover_both_trigger_families() {
		let names: Vec<_> = VariantKind::ALL
			.iter()
			.map(|k| k.preset().trigger.name())
			.collect();
		assert!(names.contains(&"viewport-tap"));
		assert!(names.contains(&"element"));
		assert!(names.contains(&"web-content"));
	}

	#[test]
	fn play_and_return_uses_long_pauses() {
		let variant = VariantKind::PlayAndReturn.preset();
		assert_eq!(variant.pause, PauseProfile::Long);
		assert_eq!(variant.primary.len(), 2);
		assert!(variant.primary[1].last_match);
		assert_eq!(VariantKind::BannerTap.preset().pause, PauseProfile::Short);
	}

	#[test]
	fn viewport_tap_point_targets_bottom_center() {
		assert_eq!(viewport_tap_point(1080, 2340, 0.5, 20), (540, 2320));
		assert_eq!(viewport_tap_point(100, 10, 1.0, 50), (99, 0));
		assert_eq!(viewport_tap_point(0, 0, 0.5, 20), (0, 0));
	}

	#[test]
	fn scroll_step_builds_uiautomator_selector() {
		let selector = ScrollStep::ToEnd { max_swipes: 5 }.selector().unwrap();
		assert_eq!(selector.strategy, Strategy::AndroidUiAutomator);
		assert!(selector.value.contains("scrollToEnd(5)"));
		assert!(ScrollStep::None.selector().is_none());
	}

	#[test]
	fn custom_variant_parses_from_json() {
		let json = r#"{
			"name": "custom",
			"primary": [{ "target": "text=Start", "timeoutMs": 1000 }],
			"scroll": { "kind": "none" },
			"trigger": { "kind": "element", "target": "accessibility-id=Banner", "timeoutMs": 500 },
			"dwell": { "kind": "random", "minMs": 100, "maxMs": 200 },
			"relaunch": { "gapMs": 10 },
			"pause": "long"
		}"#;
		let variant: LoopVariant = serde_json::from_str(json).unwrap();
		variant.validate().unwrap();
		assert_eq!(variant.primary[0].target, Selector::button_text("Start"));
		assert_eq!(variant.relaunch.reload_ms, 0);
		assert_eq!(variant.pause, PauseProfile::Long);
	}

	#[test]
	fn invalid_variants_are_rejected() {
		let mut variant = VariantKind::BannerTap.preset();
		variant.trigger = TriggerStrategy::ViewportTap {
			x_ratio: 1.5,
			bottom_offset: 0,
		};
		assert!(variant.validate().is_err());

		let mut variant = VariantKind::WebContent.preset();
		variant.dwell = Dwell::Random {
			min_ms: 10,
			max_ms: 1,
		};
		assert!(variant.validate().is_err());
	}
}
