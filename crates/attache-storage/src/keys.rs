//! Shared key generation for storage backends.
//!
//! Every backend stores an attachment's bytes under the same key, so relocation between
//! backends never has to rename anything.

use uuid::Uuid;

/// Storage key for an attachment's bytes.
pub fn object_key(attachment_id: Uuid) -> String {
    format!("attachments/{}", attachment_id)
}
