use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};

use crate::{common::types::GuildId, player::Player};

/// Guild → player map. The only place players are created or dropped.
#[derive(Default)]
pub struct PlayerRegistry {
    players: DashMap<GuildId, Arc<Player>>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<Player>> {
        self.players.get(&guild_id).map(|p| p.value().clone())
    }

    /// Returns the guild's live player, creating it with `factory` when there
    /// is none. Concurrent callers for one guild all get the same instance.
    ///
    /// A destroyed player still in the map (disposal won the race against
    /// its removal) is replaced.
    pub fn get_or_create<F>(&self, guild_id: GuildId, factory: F) -> Arc<Player>
    where
        F: FnOnce() -> Player,
    {
        match self.players.entry(guild_id) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_destroyed() {
                    let player = Arc::new(factory());
                    entry.insert(player.clone());
                    player
                } else {
                    entry.get().clone()
                }
            }
            Entry::Vacant(entry) => entry.insert(Arc::new(factory())).value().clone(),
        }
    }

    /// Removes the guild's player. Idempotent: a second call returns `None`.
    pub fn remove(&self, guild_id: GuildId) -> Option<Arc<Player>> {
        self.players.remove(&guild_id).map(|(_, player)| player)
    }

    pub fn contains(&self, guild_id: GuildId) -> bool {
        self.players.contains_key(&guild_id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Snapshot of the current players; later inserts and removals are not
    /// reflected.
    pub fn players(&self) -> Vec<Arc<Player>> {
        self.players.iter().map(|p| p.value().clone()).collect()
    }
}
