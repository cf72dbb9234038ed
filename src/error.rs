use thiserror::Error;

/// A DOM operation that could not be carried out on a single node.
///
/// These never escape the public highlighting entry points.
/// The affected node is left as-is and the pass continues with the next one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
	/// The node was removed from its tree (or freed) since it was collected.
	#[error("node is no longer attached to the document")]
	Detached,
	/// The operation needs a parent but the node has none.
	#[error("node has no parent")]
	NoParent,
	/// The operation would produce an invalid tree, e.g. inserting a node into itself.
	#[error("invalid hierarchy: {0}")]
	Hierarchy(&'static str),
	/// An exception thrown by the host DOM.
	#[error("DOM exception: {0}")]
	Js(String),
}

/// A [`HighlightConfig`](`crate::HighlightConfig`) that could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// The JSON was malformed or didn't describe a configuration.
	#[error("malformed configuration JSON: {0}")]
	Json(#[from] serde_json::Error),
}
