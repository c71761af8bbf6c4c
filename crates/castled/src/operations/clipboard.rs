//! Clipboard access through `arboard`.

use std::sync::{Arc, Mutex, PoisonError};

use arboard::Clipboard;
use serde_json::json;

use crate::operation::{OperationError, ParamLookup, ParamMap, ResultMap, into_result};
use crate::registry::OperationRegistry;

const CAPABILITY: &str = "clipboard access";

pub(super) fn register(registry: &mut OperationRegistry) {
    let clipboard = Arc::new(SharedClipboard::default());

    let reader = Arc::clone(&clipboard);
    registry.register("get_clipboard", move |_: ParamMap| read_text(&reader));
    registry.register("set_clipboard", move |params: ParamMap| {
        write_text(&clipboard, &params)
    });
}

fn read_text(clipboard: &SharedClipboard) -> Result<ResultMap, OperationError> {
    let text = clipboard.with(|clipboard| match clipboard.get_text() {
        Err(arboard::Error::ContentNotAvailable) => Ok(String::new()),
        other => other,
    })?;
    Ok(into_result(json!({ "text": text })))
}

fn write_text(clipboard: &SharedClipboard, params: &ParamMap) -> Result<ResultMap, OperationError> {
    let text = params
        .optional_str("text")?
        .ok_or_else(|| OperationError::missing("text"))?
        .to_owned();
    clipboard.with(|clipboard| clipboard.set_text(text))?;
    Ok(into_result(json!({ "success": true })))
}

/// Lazily opened clipboard handle shared by both operations.
///
/// On X11 the clipboard contents belong to the process holding the handle,
/// so the handle is kept for the agent's lifetime once opened.
#[derive(Default)]
struct SharedClipboard {
    handle: Mutex<Option<Clipboard>>,
}

impl SharedClipboard {
    fn with<T>(
        &self,
        action: impl FnOnce(&mut Clipboard) -> Result<T, arboard::Error>,
    ) -> Result<T, OperationError> {
        let mut guard = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            *guard = Some(Clipboard::new().map_err(clipboard_error)?);
        }
        match guard.as_mut() {
            Some(clipboard) => action(clipboard).map_err(clipboard_error),
            None => Err(OperationError::unavailable(CAPABILITY)),
        }
    }
}

fn clipboard_error(error: arboard::Error) -> OperationError {
    match error {
        arboard::Error::ClipboardNotSupported => OperationError::unavailable(CAPABILITY),
        other => OperationError::failed(format!("clipboard error: {other}")),
    }
}
