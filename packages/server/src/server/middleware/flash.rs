use axum::{extract::Request, middleware::Next, response::Response};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::server::auth::Session;

/// Session key holding pending flash messages
pub const FLASH_KEY: &str = "flash";

/// One-shot messages stored in the session until read
#[derive(Clone, Debug)]
pub struct Flash {
    session: Session,
}

impl Flash {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// Queue a message of `kind` for a later request.
    pub fn push(&self, kind: &str, message: impl Into<String>) {
        let message = Value::String(message.into());
        self.session.update(|data| {
            let flash = data
                .values
                .entry(FLASH_KEY)
                .or_insert_with(|| Value::Object(Map::new()));
            if !flash.is_object() {
                *flash = Value::Object(Map::new());
            }
            if let Value::Object(kinds) = flash {
                match kinds.entry(kind) {
                    serde_json::map::Entry::Occupied(mut entry) => match entry.get_mut() {
                        Value::Array(messages) => messages.push(message),
                        other => *other = Value::Array(vec![message]),
                    },
                    serde_json::map::Entry::Vacant(entry) => {
                        entry.insert(Value::Array(vec![message]));
                    }
                }
            }
        });
    }

    /// Read and clear the messages of `kind`.
    pub fn take(&self, kind: &str) -> Vec<String> {
        let taken = self.session.update(|data| {
            let Some(Value::Object(kinds)) = data.values.get_mut(FLASH_KEY) else {
                return None;
            };
            let messages = kinds.remove(kind);
            if kinds.is_empty() {
                data.values.remove(FLASH_KEY);
            }
            messages
        });
        messages_of(taken)
    }

    /// Read and clear every pending message.
    pub fn take_all(&self) -> BTreeMap<String, Vec<String>> {
        let Some(Value::Object(kinds)) = self.session.remove(FLASH_KEY) else {
            return BTreeMap::new();
        };
        kinds
            .into_iter()
            .map(|(kind, messages)| (kind, messages_of(Some(messages))))
            .collect()
    }
}

fn messages_of(value: Option<Value>) -> Vec<String> {
    match value {
        Some(Value::Array(messages)) => messages
            .into_iter()
            .filter_map(|m| m.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Flash middleware; needs the session stage to have run.
pub async fn attach_flash(mut request: Request, next: Next) -> Response {
    if let Some(session) = request.extensions().get::<Session>().cloned() {
        request.extensions_mut().insert(Flash::new(session));
    }
    next.run(request).await
}
