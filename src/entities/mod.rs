//! Entity Registry (spec §4 "6%", §5 "Entity lookup: process-wide
//! read-through cache populated at startup from the `entities` table;
//! writes invalidate the corresponding cache entries").

use dashmap::DashMap;

use crate::classifier::KNOWN_DEX_PROGRAMS;
use crate::error::AppError;
use crate::model::{Entity, EntityKind, RiskLevel};
use crate::persistence::{Db, EntityDao};

/// Bridge, lending, and mixer/sanctioned seed entries (spec §6: "Known DEX /
/// bridge / lending program IDs seeded at startup... The table is
/// configuration, not code; new entries are appended by ops"). Kept small
/// and explicit here since no external configuration source is wired up.
const SEED_BRIDGES: &[(&str, &str)] = &[("wormDTUJ6AWPNvk59vGQbDvGJmqbDTdgWgAqcLBCgUb", "Wormhole")];
const SEED_LENDING: &[(&str, &str)] = &[("4MangoMjqJ2firMokCjjGgoK8d4MXcrgL7XJaL3w6fVg", "Mango Markets")];
const SEED_MIXERS: &[&str] = &[];
const SEED_SANCTIONED: &[&str] = &[];

pub struct EntityRegistry {
    cache: DashMap<String, Entity>,
    db: Db,
}

impl EntityRegistry {
    /// Loads the process-wide cache from the `entities` table, seeding it
    /// with the known program-id table on first run.
    pub async fn load(db: Db) -> Result<Self, AppError> {
        let registry = EntityRegistry {
            cache: DashMap::new(),
            db,
        };
        registry.seed_known_programs().await?;
        let persisted = EntityDao::list_all(&registry.db).await?;
        for entity in persisted {
            registry.cache.insert(entity.address.clone(), entity);
        }
        Ok(registry)
    }

    async fn seed_known_programs(&self) -> Result<(), AppError> {
        for (address, name) in KNOWN_DEX_PROGRAMS {
            self.seed_one(address, EntityKind::Dex, name).await?;
        }
        for (address, name) in SEED_BRIDGES {
            self.seed_one(address, EntityKind::Bridge, name).await?;
        }
        for (address, name) in SEED_LENDING {
            self.seed_one(address, EntityKind::Lending, name).await?;
        }
        for address in SEED_MIXERS {
            self.seed_one(address, EntityKind::Mixer, "mixer").await?;
        }
        for address in SEED_SANCTIONED {
            self.seed_one(address, EntityKind::Sanctioned, "sanctioned").await?;
        }
        Ok(())
    }

    async fn seed_one(&self, address: &str, kind: EntityKind, name: &str) -> Result<(), AppError> {
        if EntityDao::get(&self.db, address).await?.is_some() {
            return Ok(());
        }
        let entity = Entity {
            address: address.to_string(),
            entity_kind: kind,
            name: Some(name.to_string()),
            risk_level: RiskLevel::Low,
            risk_score: 0,
            metadata: serde_json::json!({ "seeded": true }),
        };
        EntityDao::upsert(&self.db, &entity).await?;
        Ok(())
    }

    /// Read-through: serve from the in-process cache, falling back to the
    /// DB, and populating the cache on a DB hit.
    pub async fn get(&self, address: &str) -> Result<Option<Entity>, AppError> {
        if let Some(entity) = self.cache.get(address) {
            return Ok(Some(entity.clone()));
        }
        let fetched = EntityDao::get(&self.db, address).await?;
        if let Some(entity) = &fetched {
            self.cache.insert(address.to_string(), entity.clone());
        }
        Ok(fetched)
    }

    pub fn kind_of_cached(&self, address: &str) -> Option<EntityKind> {
        self.cache.get(address).map(|e| e.entity_kind)
    }

    pub fn is_mixer(&self, address: &str) -> bool {
        self.kind_of_cached(address) == Some(EntityKind::Mixer)
    }

    pub fn is_sanctioned(&self, address: &str) -> bool {
        self.kind_of_cached(address) == Some(EntityKind::Sanctioned)
    }

    /// Persists a newly-observed entity and invalidates (overwrites) its
    /// cache entry (spec §5: "writes invalidate the corresponding cache
    /// entries").
    pub async fn upsert(&self, entity: Entity) -> Result<(), AppError> {
        EntityDao::upsert(&self.db, &entity).await?;
        self.cache.insert(entity.address.clone(), entity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence;

    #[tokio::test]
    async fn seeds_known_dex_programs_on_load() {
        let db = persistence::open_in_memory().unwrap();
        let registry = EntityRegistry::load(db).await.unwrap();
        let (program_id, _) = KNOWN_DEX_PROGRAMS[0];
        let entity = registry.get(program_id).await.unwrap().unwrap();
        assert_eq!(entity.entity_kind, EntityKind::Dex);
    }

    #[tokio::test]
    async fn upsert_overwrites_cache_entry() {
        let db = persistence::open_in_memory().unwrap();
        let registry = EntityRegistry::load(db).await.unwrap();
        let addr = "pool1";
        registry
            .upsert(Entity {
                address: addr.into(),
                entity_kind: EntityKind::Pool,
                name: None,
                risk_level: RiskLevel::Low,
                risk_score: 0,
                metadata: serde_json::Value::Null,
            })
            .await
            .unwrap();
        assert!(registry.get(addr).await.unwrap().is_some());
        assert_eq!(registry.kind_of_cached(addr), Some(EntityKind::Pool));
    }
}
