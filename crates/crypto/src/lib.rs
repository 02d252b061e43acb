//! parley-crypto — end-to-end encryption core for the Parley chat client.
//!
//! Provides identity/exchange key generation, an encrypted local key vault,
//! per-room symmetric keys wrapped for each member via hybrid ECIES,
//! AES-256-GCM content encryption, password-based key backup, and room
//! provisioning against directory/storage collaborators.

pub mod backup;
pub mod content;
mod encoding;
pub mod error;
pub mod keys;
pub mod protection;
pub mod room_key;
pub mod rooms;
pub mod vault;
pub mod wrap;
