//! Room provisioning: directory lookup, room-key generation, per-member
//! wrapping, and persistence at room creation.
//!
//! The directory and storage collaborators are external services reached over
//! the network; this module sees them only as traits. Persistence is a
//! sequence of best-effort writes with no cross-write transaction: a failure
//! mid-sequence leaves the earlier writes in place and is reported as `Db`,
//! never rolled back silently. Retrying is a caller decision.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use parley_shared::ids::{RoomId, UserId};

use crate::error::{RoomError, StoreError};
use crate::keys::ExchangePublicKey;
use crate::room_key::RoomKey;
use crate::wrap::{wrap_room_key, WrappedKeyRecord};

/// Room classification persisted with the room row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomKind {
    Direct,
    Group,
}

/// Opaque room row handed to the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRecord {
    pub room_id: RoomId,
    pub kind: RoomKind,
    pub ephemeral: bool,
}

/// A freshly created room and its plaintext key, held only by the creator.
/// Other members recover the key from their own `WrappedKeyRecord`.
#[derive(Debug)]
pub struct ProvisionedRoom {
    pub room_id: RoomId,
    pub room_key: RoomKey,
}

/// Outcome of [`RoomProvisioner::find_or_create_dm`].
#[derive(Debug)]
pub enum DmRoom {
    /// A direct room with the exact member set already existed. The caller
    /// unwraps its own key record to read it.
    Existing { room_id: RoomId },
    /// No match was found; a room was created.
    Created(ProvisionedRoom),
}

impl DmRoom {
    pub fn room_id(&self) -> RoomId {
        match self {
            DmRoom::Existing { room_id } => *room_id,
            DmRoom::Created(room) => room.room_id,
        }
    }
}

/// Resolves user ids to their published exchange public keys. A missing key
/// is a valid answer, not a transport error.
#[async_trait]
pub trait KeyDirectory {
    async fn published_keys(
        &self,
        ids: &[UserId],
    ) -> Result<HashMap<UserId, Option<ExchangePublicKey>>, StoreError>;
}

/// Persists room, membership, and wrapped-key rows. An untrusted blob store
/// from this subsystem's perspective: everything it holds is ciphertext or
/// public metadata.
#[async_trait]
pub trait RoomStore {
    async fn insert_room(&self, room: &RoomRecord) -> Result<(), StoreError>;
    async fn insert_members(&self, room_id: RoomId, members: &[UserId]) -> Result<(), StoreError>;
    async fn insert_wrapped_key(&self, record: &WrappedKeyRecord) -> Result<(), StoreError>;
    /// Direct rooms the user belongs to, with their full member sets.
    async fn direct_rooms_of(
        &self,
        user: UserId,
    ) -> Result<Vec<(RoomRecord, Vec<UserId>)>, StoreError>;
}

/// Orchestrates room creation against the two collaborators.
pub struct RoomProvisioner<D, S> {
    directory: D,
    store: S,
}

impl<D: KeyDirectory + Sync, S: RoomStore + Sync> RoomProvisioner<D, S> {
    pub fn new(directory: D, store: S) -> Self {
        Self { directory, store }
    }

    /// Create a room for `members`: resolve their published keys, generate
    /// one room key, wrap it for every member, and persist the lot.
    ///
    /// Any member without a published key aborts the whole call with
    /// `MissingKeys` before anything is generated or written.
    pub async fn create_room(
        &self,
        members: &[UserId],
        kind: RoomKind,
        ephemeral: bool,
    ) -> Result<ProvisionedRoom, RoomError> {
        self.create_room_with_id(RoomId::new(), members, kind, ephemeral)
            .await
    }

    async fn create_room_with_id(
        &self,
        room_id: RoomId,
        members: &[UserId],
        kind: RoomKind,
        ephemeral: bool,
    ) -> Result<ProvisionedRoom, RoomError> {
        let members: Vec<UserId> = {
            let mut seen = BTreeSet::new();
            members.iter().copied().filter(|m| seen.insert(*m)).collect()
        };

        let published = self.directory.published_keys(&members).await?;
        let missing: Vec<UserId> = members
            .iter()
            .filter(|m| !matches!(published.get(m), Some(Some(_))))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(RoomError::MissingKeys(missing));
        }

        let room_key = RoomKey::generate();

        // Wraps are independent per recipient; order carries no meaning.
        let mut records = Vec::with_capacity(members.len());
        for member in &members {
            let Some(Some(recipient)) = published.get(member) else {
                continue;
            };
            records.push(wrap_room_key(&room_key, recipient, room_id, *member)?);
        }

        let room = RoomRecord {
            room_id,
            kind,
            ephemeral,
        };
        self.store.insert_room(&room).await?;
        self.store.insert_members(room_id, &members).await?;
        for record in &records {
            if let Err(e) = self.store.insert_wrapped_key(record).await {
                tracing::warn!(
                    room_id = %room_id,
                    user_id = %record.user_id,
                    "wrapped-key write failed; room may be partially provisioned"
                );
                return Err(RoomError::Db(e));
            }
        }

        Ok(ProvisionedRoom { room_id, room_key })
    }

    /// Find the caller's existing direct room with `peer_id`, or create one.
    ///
    /// `peer_id == self_id` is the self-chat case: its room id is derived
    /// from the identity, so concurrent callers converge on one room without
    /// coordination. Peer-to-peer creation still races across clients; the
    /// member-set search narrows the window but cannot close it.
    pub async fn find_or_create_dm(
        &self,
        self_id: UserId,
        peer_id: UserId,
    ) -> Result<DmRoom, RoomError> {
        let want: BTreeSet<UserId> = if self_id == peer_id {
            BTreeSet::from([self_id])
        } else {
            BTreeSet::from([self_id, peer_id])
        };

        for (room, members) in self.store.direct_rooms_of(self_id).await? {
            let got: BTreeSet<UserId> = members.into_iter().collect();
            if got == want {
                return Ok(DmRoom::Existing {
                    room_id: room.room_id,
                });
            }
        }

        let room_id = if self_id == peer_id {
            RoomId::for_self_chat(self_id)
        } else {
            RoomId::new()
        };
        let members: Vec<UserId> = want.into_iter().collect();
        let created = self
            .create_room_with_id(room_id, &members, RoomKind::Direct, false)
            .await?;
        Ok(DmRoom::Created(created))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CryptoError;
    use crate::keys::ExchangeKeyPair;
    use crate::wrap::unwrap_room_key;
    use futures::executor::block_on;
    use std::sync::Mutex;

    struct MemDirectory {
        keys: HashMap<UserId, ExchangePublicKey>,
    }

    impl MemDirectory {
        fn new(entries: &[(UserId, &ExchangeKeyPair)]) -> Self {
            Self {
                keys: entries
                    .iter()
                    .map(|(id, pair)| (*id, pair.public()))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl KeyDirectory for MemDirectory {
        async fn published_keys(
            &self,
            ids: &[UserId],
        ) -> Result<HashMap<UserId, Option<ExchangePublicKey>>, StoreError> {
            Ok(ids
                .iter()
                .map(|id| (*id, self.keys.get(id).copied()))
                .collect())
        }
    }

    #[derive(Default)]
    struct MemStore {
        rooms: Mutex<HashMap<RoomId, (RoomRecord, Vec<UserId>)>>,
        wrapped: Mutex<Vec<WrappedKeyRecord>>,
    }

    impl MemStore {
        fn room_count(&self) -> usize {
            self.rooms.lock().unwrap().len()
        }

        fn wrapped_for(&self, room_id: RoomId, user_id: UserId) -> Vec<WrappedKeyRecord> {
            self.wrapped
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.room_id == room_id && r.user_id == user_id)
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl RoomStore for MemStore {
        async fn insert_room(&self, room: &RoomRecord) -> Result<(), StoreError> {
            self.rooms
                .lock()
                .unwrap()
                .insert(room.room_id, (room.clone(), Vec::new()));
            Ok(())
        }

        async fn insert_members(
            &self,
            room_id: RoomId,
            members: &[UserId],
        ) -> Result<(), StoreError> {
            let mut rooms = self.rooms.lock().unwrap();
            let entry = rooms
                .get_mut(&room_id)
                .ok_or_else(|| StoreError("room not found".into()))?;
            entry.1 = members.to_vec();
            Ok(())
        }

        async fn insert_wrapped_key(&self, record: &WrappedKeyRecord) -> Result<(), StoreError> {
            self.wrapped.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn direct_rooms_of(
            &self,
            user: UserId,
        ) -> Result<Vec<(RoomRecord, Vec<UserId>)>, StoreError> {
            Ok(self
                .rooms
                .lock()
                .unwrap()
                .values()
                .filter(|(room, members)| {
                    room.kind == RoomKind::Direct && members.contains(&user)
                })
                .cloned()
                .collect())
        }
    }

    /// Store whose wrapped-key writes always fail, for the partial-write path.
    #[derive(Default)]
    struct BrokenWrapStore {
        inner: MemStore,
    }

    #[async_trait]
    impl RoomStore for BrokenWrapStore {
        async fn insert_room(&self, room: &RoomRecord) -> Result<(), StoreError> {
            self.inner.insert_room(room).await
        }

        async fn insert_members(
            &self,
            room_id: RoomId,
            members: &[UserId],
        ) -> Result<(), StoreError> {
            self.inner.insert_members(room_id, members).await
        }

        async fn insert_wrapped_key(&self, _: &WrappedKeyRecord) -> Result<(), StoreError> {
            Err(StoreError("disk full".into()))
        }

        async fn direct_rooms_of(
            &self,
            user: UserId,
        ) -> Result<Vec<(RoomRecord, Vec<UserId>)>, StoreError> {
            self.inner.direct_rooms_of(user).await
        }
    }

    #[test]
    fn create_room_wraps_key_once_per_member() {
        let alice = UserId::new();
        let bob = UserId::new();
        let alice_keys = ExchangeKeyPair::generate();
        let bob_keys = ExchangeKeyPair::generate();

        let provisioner = RoomProvisioner::new(
            MemDirectory::new(&[(alice, &alice_keys), (bob, &bob_keys)]),
            MemStore::default(),
        );

        let room = block_on(provisioner.create_room(&[alice, bob], RoomKind::Group, false))
            .unwrap();

        let alice_records = provisioner.store.wrapped_for(room.room_id, alice);
        let bob_records = provisioner.store.wrapped_for(room.room_id, bob);
        assert_eq!(alice_records.len(), 1);
        assert_eq!(bob_records.len(), 1);

        // Each record opens only with the matching private key.
        let key_a = unwrap_room_key(&alice_records[0], &alice_keys).unwrap();
        let key_b = unwrap_room_key(&bob_records[0], &bob_keys).unwrap();
        assert_eq!(key_a, room.room_key);
        assert_eq!(key_b, room.room_key);
        assert!(matches!(
            unwrap_room_key(&alice_records[0], &bob_keys),
            Err(CryptoError::DecryptFailed)
        ));
    }

    #[test]
    fn create_room_deduplicates_members() {
        let alice = UserId::new();
        let alice_keys = ExchangeKeyPair::generate();
        let provisioner = RoomProvisioner::new(
            MemDirectory::new(&[(alice, &alice_keys)]),
            MemStore::default(),
        );

        let room = block_on(provisioner.create_room(
            &[alice, alice, alice],
            RoomKind::Group,
            false,
        ))
        .unwrap();

        assert_eq!(provisioner.store.wrapped_for(room.room_id, alice).len(), 1);
    }

    #[test]
    fn create_room_aborts_when_member_has_no_published_key() {
        let alice = UserId::new();
        let bob = UserId::new();
        let alice_keys = ExchangeKeyPair::generate();

        let provisioner = RoomProvisioner::new(
            MemDirectory::new(&[(alice, &alice_keys)]),
            MemStore::default(),
        );

        let result = block_on(provisioner.create_room(&[alice, bob], RoomKind::Group, false));
        match result {
            Err(RoomError::MissingKeys(ids)) => assert_eq!(ids, vec![bob]),
            other => panic!("expected MissingKeys, got: {other:?}"),
        }
        assert_eq!(provisioner.store.room_count(), 0);
    }

    #[test]
    fn create_room_rejects_low_order_published_key() {
        let alice = UserId::new();
        let hostile = ExchangePublicKey::from_base64(&crate::encoding::encode(&[0u8; 32]))
            .unwrap();

        struct HostileDirectory {
            id: UserId,
            key: ExchangePublicKey,
        }

        #[async_trait]
        impl KeyDirectory for HostileDirectory {
            async fn published_keys(
                &self,
                ids: &[UserId],
            ) -> Result<HashMap<UserId, Option<ExchangePublicKey>>, StoreError> {
                Ok(ids
                    .iter()
                    .map(|id| (*id, (*id == self.id).then_some(self.key)))
                    .collect())
            }
        }

        let provisioner = RoomProvisioner::new(
            HostileDirectory {
                id: alice,
                key: hostile,
            },
            MemStore::default(),
        );

        let result = block_on(provisioner.create_room(&[alice], RoomKind::Group, false));
        assert!(matches!(result, Err(RoomError::Crypto(_))));
    }

    #[test]
    fn failed_wrapped_key_write_reports_db_error() {
        let alice = UserId::new();
        let alice_keys = ExchangeKeyPair::generate();
        let provisioner = RoomProvisioner::new(
            MemDirectory::new(&[(alice, &alice_keys)]),
            BrokenWrapStore::default(),
        );

        let result = block_on(provisioner.create_room(&[alice], RoomKind::Group, false));
        assert!(matches!(result, Err(RoomError::Db(_))));
        // The documented gap: the room row written before the failure stays.
        assert_eq!(provisioner.store.inner.room_count(), 1);
    }

    #[test]
    fn find_or_create_dm_creates_then_finds() {
        let alice = UserId::new();
        let bob = UserId::new();
        let alice_keys = ExchangeKeyPair::generate();
        let bob_keys = ExchangeKeyPair::generate();

        let provisioner = RoomProvisioner::new(
            MemDirectory::new(&[(alice, &alice_keys), (bob, &bob_keys)]),
            MemStore::default(),
        );

        let first = block_on(provisioner.find_or_create_dm(alice, bob)).unwrap();
        assert!(matches!(first, DmRoom::Created(_)));

        let second = block_on(provisioner.find_or_create_dm(alice, bob)).unwrap();
        assert!(matches!(second, DmRoom::Existing { .. }));
        assert_eq!(first.room_id(), second.room_id());
        assert_eq!(provisioner.store.room_count(), 1);
    }

    #[test]
    fn self_chat_does_not_match_peer_chat() {
        let alice = UserId::new();
        let bob = UserId::new();
        let alice_keys = ExchangeKeyPair::generate();
        let bob_keys = ExchangeKeyPair::generate();

        let provisioner = RoomProvisioner::new(
            MemDirectory::new(&[(alice, &alice_keys), (bob, &bob_keys)]),
            MemStore::default(),
        );

        let peer_room = block_on(provisioner.find_or_create_dm(alice, bob)).unwrap();
        let self_room = block_on(provisioner.find_or_create_dm(alice, alice)).unwrap();
        assert_ne!(peer_room.room_id(), self_room.room_id());
        assert_eq!(provisioner.store.room_count(), 2);
    }

    #[test]
    fn self_chat_uses_identity_derived_room_id() {
        let alice = UserId::new();
        let alice_keys = ExchangeKeyPair::generate();
        let provisioner = RoomProvisioner::new(
            MemDirectory::new(&[(alice, &alice_keys)]),
            MemStore::default(),
        );

        let room = block_on(provisioner.find_or_create_dm(alice, alice)).unwrap();
        assert_eq!(room.room_id(), RoomId::for_self_chat(alice));
    }

    #[test]
    fn concurrent_self_chat_creation_converges_on_one_room() {
        let alice = UserId::new();
        let alice_keys = ExchangeKeyPair::generate();
        let provisioner = RoomProvisioner::new(
            MemDirectory::new(&[(alice, &alice_keys)]),
            MemStore::default(),
        );

        let (a, b) = block_on(async {
            futures::join!(
                provisioner.find_or_create_dm(alice, alice),
                provisioner.find_or_create_dm(alice, alice)
            )
        });

        assert_eq!(a.unwrap().room_id(), b.unwrap().room_id());
        assert_eq!(provisioner.store.room_count(), 1);
    }
}
