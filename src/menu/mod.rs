// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The menu document.
//!
//! The whole displayed menu is one JSON object:
//!
//! ```json
//! { "items": [ ...8 records... ], "featured": { ... }, "beverages": [ ... ] }
//! ```
//!
//! Only the shape is checked. Item, featured and beverage records are opaque
//! to the server and are stored exactly as the admin page sent them, in the
//! same key order.

mod repository;

pub use repository::MenuRepository;

use std::io;

use serde_json::{Map, Value};
use thiserror::Error;

/// Number of entries the `items` sequence must hold.
pub const MENU_ITEM_COUNT: usize = 8;

/// A structural check the submitted menu failed.
///
/// Checks run in declaration order and stop at the first failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MenuValidationError {
    /// `items` missing, not a sequence, or not exactly 8 long.
    #[error("menu must have exactly 8 items")]
    ItemCount { found: Option<usize> },

    /// `featured` missing or empty.
    #[error("invalid menu structure")]
    MissingFeatured,

    /// `beverages` missing or not a sequence.
    #[error("invalid menu structure")]
    BeveragesNotSequence,

    /// The request body was not JSON.
    #[error("invalid menu structure")]
    NotJson,
}

impl MenuValidationError {
    /// Which constraint failed, for logs.
    pub fn constraint(&self) -> String {
        match self {
            MenuValidationError::ItemCount { found: Some(n) } => {
                format!("items must hold {} entries, found {}", MENU_ITEM_COUNT, n)
            }
            MenuValidationError::ItemCount { found: None } => "items must be a sequence".to_string(),
            MenuValidationError::MissingFeatured => "featured must be present".to_string(),
            MenuValidationError::BeveragesNotSequence => "beverages must be a sequence".to_string(),
            MenuValidationError::NotJson => "body must be a JSON object".to_string(),
        }
    }
}

/// Menu storage failures.
#[derive(Debug, Error)]
pub enum MenuError {
    #[error(transparent)]
    Invalid(#[from] MenuValidationError),

    #[error("failed to read menu file: {0}")]
    Read(#[source] io::Error),

    #[error("menu file is not valid JSON: {0}")]
    Corrupt(#[source] serde_json::Error),

    #[error("failed to write menu file: {0}")]
    Write(#[source] io::Error),

    #[error("failed to lock menu file: {0}")]
    Lock(#[source] io::Error),
}

/// A menu that passed the structural checks.
#[derive(Debug, Clone, PartialEq)]
pub struct MenuDocument {
    fields: Map<String, Value>,
}

impl MenuDocument {
    /// Validate a submitted document.
    pub fn from_value(value: Value) -> Result<Self, MenuValidationError> {
        let fields = match value {
            Value::Object(fields) => fields,
            // Anything else has no `items`, which is the first check.
            _ => return Err(MenuValidationError::ItemCount { found: None }),
        };

        match fields.get("items") {
            Some(Value::Array(items)) if items.len() == MENU_ITEM_COUNT => {}
            Some(Value::Array(items)) => {
                return Err(MenuValidationError::ItemCount { found: Some(items.len()) })
            }
            _ => return Err(MenuValidationError::ItemCount { found: None }),
        }

        if !fields.get("featured").is_some_and(is_truthy) {
            return Err(MenuValidationError::MissingFeatured);
        }

        if !matches!(fields.get("beverages"), Some(Value::Array(_))) {
            return Err(MenuValidationError::BeveragesNotSequence);
        }

        Ok(Self { fields })
    }

    /// Parse and validate a raw request body.
    pub fn from_slice(body: &[u8]) -> Result<Self, MenuValidationError> {
        let value: Value = serde_json::from_slice(body).map_err(|_| MenuValidationError::NotJson)?;
        Self::from_value(value)
    }

    pub fn items(&self) -> &[Value] {
        self.fields
            .get("items")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn beverages(&self) -> &[Value] {
        self.fields
            .get("beverages")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Pretty-printed form written to disk (2-space indent, original key order).
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.fields)
    }

    #[cfg(test)]
    pub(crate) fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

/// `featured` counts as present unless it is null, false, 0 or "".
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
