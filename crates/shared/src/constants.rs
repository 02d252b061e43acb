/// Maximum size for a single message body in bytes.
pub const MAX_MESSAGE_SIZE_BYTES: usize = 8 * 1024;
/// Maximum attachment size: 25 MB.
pub const MAX_ATTACHMENT_SIZE_BYTES: usize = 25 * 1024 * 1024;
