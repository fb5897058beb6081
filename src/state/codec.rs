// Snapshot codec - JSON encoding with format version checks

use serde_json::Value;

use super::{StateSnapshot, STATE_VERSION};
use crate::store::StoreError;

/// Encode a snapshot as pretty-printed JSON terminated by a newline
pub fn encode(state: &StateSnapshot) -> Result<Vec<u8>, StoreError> {
    let mut bytes = serde_json::to_vec_pretty(state)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decode a snapshot.
///
/// Empty input means no state has been stored yet and decodes to `None`.
/// Snapshots written by a newer format version are rejected instead of being
/// silently downgraded.
pub fn decode(bytes: &[u8]) -> Result<Option<StateSnapshot>, StoreError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let raw: Value = serde_json::from_slice(bytes)?;

    if let Some(found) = raw.get("version").and_then(Value::as_u64) {
        if found > u64::from(STATE_VERSION) {
            return Err(StoreError::UnsupportedVersion {
                found,
                supported: STATE_VERSION,
            });
        }
    }

    let state = serde_json::from_value(raw)?;
    Ok(Some(state))
}
