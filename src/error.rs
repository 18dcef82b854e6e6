use hyper::header::InvalidHeaderValue;
use thiserror::Error;

/// Errors produced while building a router or negotiating methods.
///
/// Failures raised by middleware during dispatch are carried as [`anyhow::Error`] and are
/// never wrapped in this type. At request time the crate itself creates `MethodNotAllowed`
/// and `NotImplemented` during method negotiation, `InvalidHeader` when a response header
/// can't be set, and `Panicked` when a stage panics.
#[derive(Debug, Error)]
pub enum Error {
	#[error("invalid path pattern `{pattern}`: {reason}")]
	Pattern { pattern: String, reason: String },

	#[error("no route found for name: {0}")]
	RouteNotFound(String),

	#[error("expected parameter `{0}` to be defined")]
	MissingParameter(String),

	#[error("expected parameter `{name}` to match `{pattern}`, got `{value}`")]
	InvalidParameter {
		name: String,
		pattern: String,
		value: String,
	},

	#[error(transparent)]
	InvalidHeader(#[from] InvalidHeaderValue),

	#[error("method not allowed (allow: {allow})")]
	MethodNotAllowed { allow: String },

	#[error("method not implemented (allow: {allow})")]
	NotImplemented { allow: String },

	#[error("middleware panicked: {0}")]
	Panicked(String),
}

impl Error {
	pub(crate) fn pattern(pattern: &str, reason: impl Into<String>) -> Self {
		Self::Pattern {
			pattern: pattern.to_owned(),
			reason: reason.into(),
		}
	}
}
