//! W3C WebDriver response envelopes and error payloads.
//!
//! Every WebDriver response is `{ "value": ... }`. On failure the value is an
//! error object `{ "error": "<code>", "message": ..., "stacktrace": ... }`.

use serde::{Deserialize, Serialize};

/// Key under which W3C servers return element references.
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735da0f1ba";

/// Legacy JSONWP element key, still emitted by some server versions.
pub const LEGACY_ELEMENT_KEY: &str = "ELEMENT";

/// Name of the native (non-web) driver context.
pub const NATIVE_CONTEXT: &str = "NATIVE_APP";

/// Prefix shared by embedded web content contexts (`WEBVIEW_<pkg>`).
pub const WEBVIEW_CONTEXT_PREFIX: &str = "WEBVIEW";

/// Generic `{ "value": T }` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
	pub value: T,
}

/// Value of a successful `POST /session`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
	pub session_id: String,
	#[serde(default)]
	pub capabilities: serde_json::Value,
}

/// Opaque element reference returned by `find element`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef(pub String);

impl ElementRef {
	/// Extracts the reference from a `find element` value object.
	pub fn from_value(value: &serde_json::Value) -> Option<Self> {
		value
			.get(ELEMENT_KEY)
			.or_else(|| value.get(LEGACY_ELEMENT_KEY))
			.and_then(|v| v.as_str())
			.map(|id| Self(id.to_string()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

/// Value of `GET /session/{id}/window/rect`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowRect {
	#[serde(default)]
	pub x: f64,
	#[serde(default)]
	pub y: f64,
	pub width: f64,
	pub height: f64,
}

/// Error object carried in a failed response's `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
	pub error: String,
	#[serde(default)]
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stacktrace: Option<String>,
}

impl WireError {
	/// Parses an error body. Returns `None` when the body is not a W3C error.
	pub fn from_body(body: &str) -> Option<Self> {
		serde_json::from_str::<Envelope<WireError>>(body)
			.ok()
			.map(|env| env.value)
	}

	pub fn kind(&self) -> WireErrorKind {
		WireErrorKind::from_code(&self.error)
	}
}

/// Classified W3C error codes relevant to the interaction loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireErrorKind {
	NoSuchElement,
	StaleElement,
	NotInteractable,
	Timeout,
	InvalidSession,
	NoSuchContext,
	SessionNotCreated,
	Other,
}

impl WireErrorKind {
	pub fn from_code(code: &str) -> Self {
		match code {
			"no such element" => Self::NoSuchElement,
			"stale element reference" => Self::StaleElement,
			"element not interactable" | "element click intercepted" => Self::NotInteractable,
			"timeout" | "script timeout" => Self::Timeout,
			"invalid session id" => Self::InvalidSession,
			"no such context" => Self::NoSuchContext,
			"session not created" => Self::SessionNotCreated,
			_ => Self::Other,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn element_ref_accepts_both_keys() {
		let w3c = serde_json::json!({ ELEMENT_KEY: "abc" });
		assert_eq!(ElementRef::from_value(&w3c), Some(ElementRef("abc".into())));

		let legacy = serde_json::json!({ "ELEMENT": "def" });
		assert_eq!(ElementRef::from_value(&legacy), Some(ElementRef("def".into())));

		assert_eq!(ElementRef::from_value(&serde_json::json!({})), None);
	}

	#[test]
	fn wire_error_parses_and_classifies() {
		let body = r#"{"value":{"error":"no such element","message":"An element could not be located","stacktrace":"..."}}"#;
		let err = WireError::from_body(body).unwrap();
		assert_eq!(err.kind(), WireErrorKind::NoSuchElement);
		assert_eq!(err.message, "An element could not be located");

		assert_eq!(
			WireErrorKind::from_code("invalid session id"),
			WireErrorKind::InvalidSession
		);
		assert_eq!(WireErrorKind::from_code("whatever"), WireErrorKind::Other);
		assert!(WireError::from_body("<html>502</html>").is_none());
	}

	#[test]
	fn window_rect_tolerates_missing_origin() {
		let rect: WindowRect = serde_json::from_str(r#"{"width":1080,"height":2340}"#).unwrap();
		assert_eq!(rect.width, 1080.0);
		assert_eq!(rect.x, 0.0);
	}
}
