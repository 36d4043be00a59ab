//! Wire types shared by the adcycle driver client.
//!
//! - [`SessionCapabilities`] - what a new driver session asks for
//! - [`Selector`] - element locator in both wire and textual form
//! - [`wire`] - W3C response envelopes, element references and error codes

pub mod capabilities;
pub mod selector;
pub mod wire;

pub use capabilities::SessionCapabilities;
pub use selector::{Selector, SelectorParseError, Strategy};
pub use wire::{
	ELEMENT_KEY, ElementRef, Envelope, LEGACY_ELEMENT_KEY, NATIVE_CONTEXT, NewSession,
	WEBVIEW_CONTEXT_PREFIX, WindowRect, WireError, WireErrorKind,
};
