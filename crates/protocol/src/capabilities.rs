//! Session capabilities for the UiAutomator2 driver.

use serde::{Deserialize, Serialize};

/// Vendor prefix required on non-W3C capability names.
const APPIUM_PREFIX: &str = "appium:";

/// Capabilities requested when opening a driver session for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCapabilities {
	/// Device serial the session binds to.
	pub udid: String,
	pub app_package: String,
	pub app_activity: String,
	/// Two-letter language code (`en`).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub language: Option<String>,
	/// Region code (`US`).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub locale: Option<String>,
	/// Secondary control port used by the on-device instrumentation server.
	pub system_port: u16,
	/// Seconds the server waits for a command before ending the session.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub new_command_timeout: Option<u64>,
}

impl SessionCapabilities {
	pub fn new(
		udid: impl Into<String>,
		app_package: impl Into<String>,
		app_activity: impl Into<String>,
		system_port: u16,
	) -> Self {
		Self {
			udid: udid.into(),
			app_package: app_package.into(),
			app_activity: app_activity.into(),
			language: None,
			locale: None,
			system_port,
			new_command_timeout: None,
		}
	}

	/// Applies a BCP-47 style tag such as `en-US` or `en_US`.
	///
	/// The driver wants language and region as separate capabilities; a tag
	/// without a region only sets the language.
	pub fn with_locale_tag(mut self, tag: &str) -> Self {
		let mut parts = tag.splitn(2, ['-', '_']);
		self.language = parts
			.next()
			.filter(|s| !s.is_empty())
			.map(str::to_string);
		self.locale = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
		self
	}

	pub fn with_new_command_timeout(mut self, secs: u64) -> Self {
		self.new_command_timeout = Some(secs);
		self
	}

	/// Body for `POST /session`.
	pub fn to_new_session_body(&self) -> serde_json::Value {
		let mut always = serde_json::Map::new();
		always.insert("platformName".into(), "Android".into());
		let mut put = |key: &str, value: serde_json::Value| {
			always.insert(format!("{APPIUM_PREFIX}{key}"), value);
		};
		put("automationName", "UiAutomator2".into());
		put("udid", self.udid.clone().into());
		put("appPackage", self.app_package.clone().into());
		put("appActivity", self.app_activity.clone().into());
		put("systemPort", self.system_port.into());
		if let Some(language) = &self.language {
			put("language", language.clone().into());
		}
		if let Some(locale) = &self.locale {
			put("locale", locale.clone().into());
		}
		if let Some(timeout) = self.new_command_timeout {
			put("newCommandTimeout", timeout.into());
		}

		serde_json::json!({
			"capabilities": {
				"alwaysMatch": always,
				"firstMatch": [{}],
			}
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn locale_tag_is_split() {
		let caps = SessionCapabilities::new("R5CX", "pkg", ".Main", 8200).with_locale_tag("en-US");
		assert_eq!(caps.language.as_deref(), Some("en"));
		assert_eq!(caps.locale.as_deref(), Some("US"));

		let caps = SessionCapabilities::new("R5CX", "pkg", ".Main", 8200).with_locale_tag("de");
		assert_eq!(caps.language.as_deref(), Some("de"));
		assert_eq!(caps.locale, None);
	}

	#[test]
	fn new_session_body_prefixes_vendor_capabilities() {
		let body = SessionCapabilities::new("R5CX", "com.basketballshots.app", ".MainActivity", 8201)
			.with_locale_tag("en-US")
			.to_new_session_body();

		let always = &body["capabilities"]["alwaysMatch"];
		assert_eq!(always["platformName"], "Android");
		assert_eq!(always["appium:automationName"], "UiAutomator2");
		assert_eq!(always["appium:udid"], "R5CX");
		assert_eq!(always["appium:appPackage"], "com.basketballshots.app");
		assert_eq!(always["appium:systemPort"], 8201);
		assert_eq!(always["appium:language"], "en");
		assert_eq!(always["appium:locale"], "US");
		assert!(always.get("appium:newCommandTimeout").is_none());
		assert_eq!(body["capabilities"]["firstMatch"], serde_json::json!([{}]));
	}
}
