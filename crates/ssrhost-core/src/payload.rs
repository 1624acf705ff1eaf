use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::elements::ElementTable;

/// One render request as handed to the engine.
///
/// `markup` and `initial_state` are passed through untouched; only the
/// engine interprets them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payload {
    /// HTML contents of the page.
    pub markup: String,
    /// Element name → element source, shared with every other request.
    pub elements: Arc<ElementTable>,
    #[serde(rename = "initialState")]
    pub initial_state: serde_json::Value,
}

impl Payload {
    pub fn new(
        markup: impl Into<String>,
        elements: Arc<ElementTable>,
        initial_state: serde_json::Value,
    ) -> Self {
        Self {
            markup: markup.into(),
            elements,
            initial_state,
        }
    }
}

/// What the engine sends back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderResult {
    /// Final HTML of the rendered page.
    pub document: String,
}
