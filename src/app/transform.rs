//! Response transforms with stable cache identity
//!
//! A transform reshapes a decoded JSON payload before it is cached and
//! published. Every transform carries a caller-supplied [`TransformTag`];
//! the tag, not the function, is what the cache compares when deciding
//! whether a stored entry was produced by the transform now requested.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{FetchError, FetchResult};

/// Stable version tag identifying a transform in cache keys
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransformTag(String);

impl TransformTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransformTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

type TransformFn = dyn Fn(Value) -> Result<Value, String> + Send + Sync;

/// A tagged function applied to every payload a session receives
#[derive(Clone)]
pub struct Transform {
    tag: TransformTag,
    apply: Arc<TransformFn>,
}

impl Transform {
    /// Create an infallible transform
    pub fn new<F>(tag: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Self {
            tag: TransformTag::new(tag),
            apply: Arc::new(move |value| Ok(f(value))),
        }
    }

    /// Create a transform that may reject a payload
    pub fn try_new<F>(tag: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            tag: TransformTag::new(tag),
            apply: Arc::new(f),
        }
    }

    /// Select the sub-tree at a JSON pointer (RFC 6901)
    ///
    /// The tag is derived from the pointer so two sessions selecting the
    /// same path share cache entries.
    pub fn pointer(pointer: impl Into<String>) -> Self {
        let pointer = pointer.into();
        let tag = format!("pointer:{}", pointer);
        Self::try_new(tag, move |value| {
            value
                .pointer(&pointer)
                .cloned()
                .ok_or_else(|| format!("no value at pointer '{}'", pointer))
        })
    }

    pub fn tag(&self) -> &TransformTag {
        &self.tag
    }

    /// Apply the transform, mapping rejections to [`FetchError::Transform`]
    pub fn apply(&self, value: Value) -> FetchResult<Value> {
        (self.apply)(value).map_err(|message| FetchError::Transform {
            tag: self.tag.to_string(),
            message,
        })
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform").field("tag", &self.tag).finish()
    }
}
