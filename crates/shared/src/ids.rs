macro_rules! define_id {
    ($name:ident) => {
        /// Typed wrapper around UUID v7 for entity identification.
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        pub struct $name(pub uuid::Uuid);

        #[allow(clippy::new_without_default)]
        impl $name {
            /// Generate a new time-sortable UUID v7 identifier.
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(uuid::Uuid::parse_str(s)?))
            }
        }
    };
}

define_id!(UserId);
define_id!(RoomId);
define_id!(ContentId);

/// Namespace for deterministic, identity-derived room IDs.
const SELF_CHAT_NAMESPACE: uuid::Uuid = uuid::uuid!("b5a2f1de-6a7c-4e6b-9c0d-2f4e8a1b3c5d");

impl RoomId {
    /// Deterministic room ID for a user's self-chat (UUID v5 over the owner's
    /// identity). Concurrent creators derive the same ID without coordination.
    pub fn for_self_chat(owner: UserId) -> Self {
        Self(uuid::Uuid::new_v5(&SELF_CHAT_NAMESPACE, owner.0.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn user_id_new_creates_valid_uuid() {
        let id = UserId::new();
        assert_eq!(id.0.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn user_id_roundtrip_serde() {
        let id = UserId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn user_id_display_formats_as_uuid() {
        let id = UserId::new();
        uuid::Uuid::parse_str(&id.to_string()).unwrap();
    }

    #[test]
    fn user_id_from_str_valid() {
        let id = UserId::new();
        let parsed = UserId::from_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn user_id_from_str_invalid() {
        assert!(UserId::from_str("not-a-uuid").is_err());
    }

    #[test]
    fn user_id_new_produces_unique_ids() {
        assert_ne!(UserId::new(), UserId::new());
    }

    #[test]
    fn room_id_roundtrip_serde() {
        let id = RoomId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: RoomId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn content_id_roundtrip_serde() {
        let id = ContentId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: ContentId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn self_chat_room_id_is_deterministic() {
        let owner = UserId::new();
        assert_eq!(RoomId::for_self_chat(owner), RoomId::for_self_chat(owner));
    }

    #[test]
    fn self_chat_room_id_differs_per_owner() {
        assert_ne!(
            RoomId::for_self_chat(UserId::new()),
            RoomId::for_self_chat(UserId::new())
        );
    }

    #[test]
    fn self_chat_room_id_differs_from_owner_id() {
        let owner = UserId::new();
        assert_ne!(RoomId::for_self_chat(owner).0, owner.0);
    }
}
