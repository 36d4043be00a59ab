//! Element selectors as understood by the Appium `find element` endpoint.
//!
//! A [`Selector`] pairs a locator [`Strategy`] with its query string. The
//! wire form is the W3C `{ "using": ..., "value": ... }` object; the textual
//! form (`xpath=//...`, `id=...`) is what configuration files use.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Locator strategy for a [`Selector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
	/// Android resource id (`com.example:id/name`).
	Id,
	/// Content description.
	AccessibilityId,
	XPath,
	/// Widget class name (`android.widget.Button`).
	ClassName,
	/// Raw `UiSelector` / `UiScrollable` expression.
	AndroidUiAutomator,
	/// CSS selector, only meaningful inside a web content context.
	CssSelector,
}

impl Strategy {
	/// Value of the `using` field on the wire.
	pub fn wire_name(self) -> &'static str {
		match self {
			Strategy::Id => "id",
			Strategy::AccessibilityId => "accessibility id",
			Strategy::XPath => "xpath",
			Strategy::ClassName => "class name",
			Strategy::AndroidUiAutomator => "-android uiautomator",
			Strategy::CssSelector => "css selector",
		}
	}

	/// Prefix used in the textual `prefix=value` form.
	pub fn prefix(self) -> &'static str {
		match self {
			Strategy::Id => "id",
			Strategy::AccessibilityId => "accessibility-id",
			Strategy::XPath => "xpath",
			Strategy::ClassName => "class",
			Strategy::AndroidUiAutomator => "uiautomator",
			Strategy::CssSelector => "css",
		}
	}
}

/// A locator strategy plus query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Selector {
	pub strategy: Strategy,
	pub value: String,
}

impl Selector {
	pub fn new(strategy: Strategy, value: impl Into<String>) -> Self {
		Self {
			strategy,
			value: value.into(),
		}
	}

	pub fn id(value: impl Into<String>) -> Self {
		Self::new(Strategy::Id, value)
	}

	pub fn xpath(value: impl Into<String>) -> Self {
		Self::new(Strategy::XPath, value)
	}

	pub fn class_name(value: impl Into<String>) -> Self {
		Self::new(Strategy::ClassName, value)
	}

	pub fn css(value: impl Into<String>) -> Self {
		Self::new(Strategy::CssSelector, value)
	}

	/// A native button whose visible text equals `text`.
	pub fn button_text(text: &str) -> Self {
		Self::xpath(format!(
			"//android.widget.Button[@text=\"{}\"]",
			escape_quotes(text)
		))
	}

	/// Scrolls the first scrollable container to its end, at most `max_swipes` flings.
	pub fn scroll_to_end(max_swipes: u32) -> Self {
		Self::new(
			Strategy::AndroidUiAutomator,
			format!(
				"new UiScrollable(new UiSelector().scrollable(true).instance(0)).scrollToEnd({max_swipes});"
			),
		)
	}

	/// Scrolls the first scrollable container until an element with `text` is visible.
	pub fn scroll_into_view(text: &str) -> Self {
		Self::new(
			Strategy::AndroidUiAutomator,
			format!(
				"new UiScrollable(new UiSelector().scrollable(true).instance(0))\
				 .scrollIntoView(new UiSelector().text(\"{}\").instance(0));",
				escape_quotes(text)
			),
		)
	}

	/// Request body for `POST /session/{id}/element(s)`.
	pub fn to_wire(&self) -> serde_json::Value {
		serde_json::json!({
			"using": self.strategy.wire_name(),
			"value": self.value,
		})
	}
}

fn escape_quotes(text: &str) -> String {
	text.replace('"', "\\\"")
}

impl fmt::Display for Selector {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}={}", self.strategy.prefix(), self.value)
	}
}

/// Error returned when parsing the textual selector form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorParseError {
	#[error("selector '{0}' is missing a strategy prefix (expected e.g. 'xpath=...')")]
	MissingPrefix(String),
	#[error("unknown selector strategy '{0}'")]
	UnknownStrategy(String),
	#[error("selector '{0}' has an empty value")]
	EmptyValue(String),
}

impl FromStr for Selector {
	type Err = SelectorParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let (prefix, value) = s
			.split_once('=')
			.ok_or_else(|| SelectorParseError::MissingPrefix(s.to_string()))?;
		if value.is_empty() {
			return Err(SelectorParseError::EmptyValue(s.to_string()));
		}

		let strategy = match prefix.trim() {
			"id" => Strategy::Id,
			"accessibility-id" | "aid" => Strategy::AccessibilityId,
			"xpath" => Strategy::XPath,
			"class" => Strategy::ClassName,
			"uiautomator" => Strategy::AndroidUiAutomator,
			"css" => Strategy::CssSelector,
			"text" => return Ok(Selector::button_text(value)),
			other => return Err(SelectorParseError::UnknownStrategy(other.to_string())),
		};

		Ok(Selector::new(strategy, value))
	}
}

impl Serialize for Selector {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for Selector {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let raw = String::deserialize(deserializer)?;
		raw.parse().map_err(serde::de::Error::custom)
	}
}
