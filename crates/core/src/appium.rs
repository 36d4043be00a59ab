//! [`DeviceDriver`] over the W3C WebDriver HTTP protocol spoken by Appium.

use std::time::Duration;

use adcycle_protocol::{
	ElementRef, Envelope, NewSession, Selector, SessionCapabilities, WindowRect,
	WireError, WireErrorKind,
};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use crate::driver::{DeviceDriver, DriverConnector, SessionRequest};
use crate::error::{DriverError, Result};

/// Interval between element lookups while waiting for a selector.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Upper bound on one HTTP round trip. Scroll selectors and session
/// creation can legitimately take tens of seconds.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// Seconds the server keeps an idle session alive; covers the longest pause.
const NEW_COMMAND_TIMEOUT_SECS: u64 = 300;

/// Longest slice of a non-JSON error body kept in an error message.
const BODY_EXCERPT: usize = 200;

/// Opens [`AppiumSession`]s.
#[derive(Debug, Clone)]
pub struct AppiumConnector {
	client: Client,
	poll_interval: Duration,
}

impl AppiumConnector {
	/// # Errors
	///
	/// Returns [`DriverError::Transport`] if the HTTP client cannot be built.
	pub fn new() -> Result<Self> {
		let client = Client::builder()
			.timeout(REQUEST_TIMEOUT)
			.build()
			.map_err(|e| DriverError::Transport(format!("failed to create HTTP client: {e}")))?;
		Ok(Self {
			client,
			poll_interval: DEFAULT_POLL_INTERVAL,
		})
	}

	pub fn with_poll_interval(mut self, interval: Duration) -> Self {
		self.poll_interval = interval;
		self
	}
}

#[async_trait]
impl DriverConnector for AppiumConnector {
	async fn open(&self, request: &SessionRequest) -> Result<Box<dyn DeviceDriver>> {
		let caps = SessionCapabilities::new(
			request.device.udid(),
			&request.app_package,
			&request.app_activity,
			request.control_port,
		)
		.with_locale_tag(&request.locale)
		.with_new_command_timeout(NEW_COMMAND_TIMEOUT_SECS);

		let base = request.server_url.trim_end_matches('/');
		let value = send(
			self.client
				.post(format!("{base}/session"))
				.json(&caps.to_new_session_body()),
		)
		.await
		.map_err(|e| DriverError::SessionFailed(format!("{} via {base}: {e}", request.device)))?;

		let session: NewSession = decode(value)
			.map_err(|e| DriverError::SessionFailed(format!("{} via {base}: {e}", request.device)))?;
		debug!(
			target = "adcycle.driver",
			device = %request.device,
			session = %session.session_id,
			"session opened"
		);

		Ok(Box::new(AppiumSession {
			client: self.client.clone(),
			session_url: format!("{base}/session/{}", session.session_id),
			poll_interval: self.poll_interval,
			closed: false,
		}))
	}
}

/// One open WebDriver session.
#[derive(Debug)]
pub struct AppiumSession {
	client: Client,
	session_url: String,
	poll_interval: Duration,
	closed: bool,
}

impl AppiumSession {
	async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
		let url = format!("{}{path}", self.session_url);
		let mut request = self.client.request(method, url);
		// POST endpoints require a JSON body even when they take no parameters.
		request = match body {
			Some(body) => request.json(&body),
			None => request,
		};
		send(request).await
	}

	async fn find(&self, selector: &Selector) -> Result<ElementRef> {
		let value = self
			.command(Method::POST, "/element", Some(selector.to_wire()))
			.await
			.map_err(|e| not_found_for(e, selector))?;
		ElementRef::from_value(&value)
			.ok_or_else(|| DriverError::InvalidResponse(format!("no element reference in {value}")))
	}

	async fn find_all(&self, selector: &Selector) -> Result<Vec<ElementRef>> {
		let value = self
			.command(Method::POST, "/elements", Some(selector.to_wire()))
			.await?;
		let items = value
			.as_array()
			.ok_or_else(|| DriverError::InvalidResponse(format!("expected element list, got {value}")))?;
		Ok(items.iter().filter_map(ElementRef::from_value).collect())
	}

	async fn click(&self, element: &ElementRef) -> Result<()> {
		self.command(
			Method::POST,
			&format!("/element/{}/click", element.as_str()),
			Some(json!({})),
		)
		.await
		.map(drop)
	}

	async fn mobile(&self, script: &str, args: Value) -> Result<Value> {
		self.command(
			Method::POST,
			"/execute/sync",
			Some(json!({ "script": script, "args": [args] })),
		)
		.await
	}

	async fn try_activate(&self, selector: &Selector) -> Result<()> {
		let element = self.find(selector).await?;
		self.click(&element).await
	}
}

#[async_trait]
impl DeviceDriver for AppiumSession {
	async fn locate_and_activate(&mut self, selector: &Selector, timeout: Duration) -> Result<()> {
		let deadline = tokio::time::Instant::now() + timeout;
		loop {
			match self.try_activate(selector).await {
				Ok(()) => return Ok(()),
				Err(err) if !err.is_probe() => return Err(err),
				Err(err) => {
					if tokio::time::Instant::now() + self.poll_interval > deadline {
						return Err(if timeout.is_zero() {
							err
						} else {
							DriverError::Timeout {
								ms: timeout.as_millis() as u64,
								what: selector.to_string(),
							}
						});
					}
				}
			}
			tokio::time::sleep(self.poll_interval).await;
		}
	}

	async fn activate_last(&mut self, selector: &Selector) -> Result<usize> {
		let elements = self.find_all(selector).await?;
		let last = elements.last().ok_or_else(|| DriverError::NotFound {
			selector: selector.to_string(),
		})?;
		self.click(last).await?;
		Ok(elements.len())
	}

	async fn scroll_container(&mut self, selector: &Selector) -> Result<()> {
		self.find(selector).await.map(drop)
	}

	async fn viewport_size(&mut self) -> Result<(u32, u32)> {
		let rect: WindowRect = decode(self.command(Method::GET, "/window/rect", None).await?)?;
		Ok((rect.width.max(0.0) as u32, rect.height.max(0.0) as u32))
	}

	async fn tap_at(&mut self, x: u32, y: u32) -> Result<()> {
		self.mobile("mobile: clickGesture", json!({ "x": x, "y": y }))
			.await
			.map(drop)
	}

	async fn contexts(&mut self) -> Result<Vec<String>> {
		decode(self.command(Method::GET, "/contexts", None).await?)
	}

	async fn switch_context(&mut self, name: &str) -> Result<()> {
		self.command(Method::POST, "/context", Some(json!({ "name": name })))
			.await
			.map(drop)
	}

	async fn terminate_app(&mut self, package: &str) -> Result<()> {
		self.mobile("mobile: terminateApp", json!({ "appId": package }))
			.await
			.map(drop)
	}

	async fn activate_app(&mut self, package: &str) -> Result<()> {
		self.mobile("mobile: activateApp", json!({ "appId": package }))
			.await
			.map(drop)
	}

	async fn close(&mut self) -> Result<()> {
		if self.closed {
			return Ok(());
		}
		self.closed = true;
		send(self.client.delete(&self.session_url)).await.map(drop)
	}
}

/// Sends a WebDriver request and unwraps the `value` of the response.
async fn send(request: reqwest::RequestBuilder) -> Result<Value> {
	let response = request
		.send()
		.await
		.map_err(|e| DriverError::Transport(e.to_string()))?;
	let status = response.status();
	let body = response
		.text()
		.await
		.map_err(|e| DriverError::Transport(e.to_string()))?;

	if status.is_success() {
		return serde_json::from_str::<Envelope<Value>>(&body)
			.map(|env| env.value)
			.map_err(|e| DriverError::InvalidResponse(format!("{e}: {}", excerpt(&body))));
	}

	match WireError::from_body(&body) {
		Some(err) => Err(DriverError::from_wire(err)),
		None => Err(DriverError::Remote {
			code: status.to_string(),
			message: excerpt(&body).to_string(),
		}),
	}
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
	serde_json::from_value(value).map_err(|e| DriverError::InvalidResponse(e.to_string()))
}

fn not_found_for(err: DriverError, selector: &Selector) -> DriverError {
	match &err {
		DriverError::Remote { code, .. }
			if WireErrorKind::from_code(code) == WireErrorKind::NoSuchElement =>
		{
			DriverError::NotFound {
				selector: selector.to_string(),
			}
		}
		_ => err,
	}
}

fn excerpt(body: &str) -> &str {
	match body.char_indices().nth(BODY_EXCERPT) {
		Some((idx, _)) => &body[..idx],
		None => body,
	}
}
