//! Test fixtures: schema metadata, access policies, records and chunk payloads

use std::sync::Arc;

use serde_json::json;

use attache_core::constants::STAGING_STORAGE;
use attache_core::models::{Attachment, AttachmentRole};
use attache_core::transport::encode_data_url;
use attache_core::{AccessControl, AccessPolicy, JsonMetadata, PolicyAccessControl};

/// Schema used across tests.
///
/// - `Account.logo`: image, 5 MB override
/// - `Account.contract`: file, zero override
/// - `Account.attachments`: attachmentMultiple
/// - `Account.description`: wysiwyg
/// - `Contact.avatar`: image
/// - `Settings.companyLogo`: image
pub fn metadata() -> JsonMetadata {
    JsonMetadata::new(json!({
        "entityDefs": {
            "Account": {
                "fields": {
                    "logo": { "type": "image", "maxFileSize": 5 },
                    "contract": { "type": "file", "maxFileSize": 0 },
                    "attachments": { "type": "attachmentMultiple" },
                    "description": { "type": "wysiwyg" }
                }
            },
            "Contact": {
                "fields": {
                    "avatar": { "type": "image" }
                }
            },
            "Settings": {
                "fields": {
                    "companyLogo": { "type": "image" }
                }
            }
        }
    }))
}

/// Everyone may create and read attachments and edit accounts, but not the account contract.
/// Actor `reader` may only read attachments.
pub fn restricted_policy() -> AccessPolicy {
    serde_json::from_value(json!({
        "default": {
            "capabilities": {
                "Attachment": ["create", "read"],
                "Account": ["edit"]
            },
            "forbiddenFields": { "Account": { "edit": ["contract"] } }
        },
        "actors": {
            "reader": {
                "capabilities": { "Attachment": ["read"], "Account": ["edit"] }
            }
        }
    }))
    .expect("valid policy")
}

pub fn restricted_acl() -> Arc<dyn AccessControl> {
    Arc::new(PolicyAccessControl::new(restricted_policy()))
}

/// A chunked upload of `size` bytes for `Account.attachments`, not yet stored anywhere.
pub fn staged_attachment(size: i64) -> Attachment {
    let mut attachment = Attachment::new(AttachmentRole::Attachment);
    attachment.name = "upload.bin".to_string();
    attachment.content_type = Some("application/octet-stream".to_string());
    attachment.size = size;
    attachment.parent_type = Some("Account".to_string());
    attachment.field = Some("attachments".to_string());
    attachment.storage = Some(STAGING_STORAGE.to_string());
    attachment.is_being_uploaded = true;
    attachment.created_by = Some("u1".to_string());
    attachment
}

/// Transport-encoded chunk carrying `bytes`.
pub fn chunk(bytes: &[u8]) -> String {
    encode_data_url("application/octet-stream", bytes)
}
