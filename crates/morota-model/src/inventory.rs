//! The module pool: unassigned modules waiting at the depot.

use std::collections::BTreeMap;

use morota_types::{Module, ModuleId, ModuleType};

use crate::error::ConfigurationError;

/// Unassigned module inventory, ordered by id within each type.
///
/// Modules are moved in and out by value, so a module taken from the pool
/// is owned by exactly one robot until it is put back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModulePool {
    modules: BTreeMap<ModuleId, Module>,
}

impl ModulePool {
    /// An empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pool from a module list.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::DuplicateModule`] if two modules share an id.
    pub fn from_modules(modules: impl IntoIterator<Item = Module>) -> Result<Self, ConfigurationError> {
        let mut pool = Self::new();
        pool.put(modules)?;
        Ok(pool)
    }

    /// Number of modules in the pool.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Whether a module is in the pool.
    pub fn contains(&self, id: ModuleId) -> bool {
        self.modules.contains_key(&id)
    }

    /// In-service module count per type.
    pub fn counts(&self) -> BTreeMap<ModuleType, u32> {
        let mut counts = BTreeMap::new();
        for module in self.modules.values().filter(|m| m.in_service()) {
            let entry = counts.entry(module.module_type).or_insert(0_u32);
            *entry = entry.saturating_add(1);
        }
        counts
    }

    /// Whether the pool holds enough in-service modules for `request`.
    pub fn can_cover(&self, request: &BTreeMap<ModuleType, u32>) -> bool {
        let available = self.counts();
        request
            .iter()
            .all(|(t, &n)| available.get(t).copied().unwrap_or(0) >= n)
    }

    /// Ids of in-service modules of one type, in ascending order.
    pub fn ids_of(&self, module_type: ModuleType) -> Vec<ModuleId> {
        self.modules
            .values()
            .filter(|m| m.module_type == module_type && m.in_service())
            .map(|m| m.id)
            .collect()
    }

    /// Reserve the lowest-id in-service modules satisfying `request`,
    /// without removing them.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::PoolDeficit`] if a type is short.
    pub fn select(&self, request: &BTreeMap<ModuleType, u32>) -> Result<Vec<ModuleId>, ConfigurationError> {
        let mut picked = Vec::new();
        for (&module_type, &wanted) in request {
            let ids = self.ids_of(module_type);
            let have = u32::try_from(ids.len()).unwrap_or(u32::MAX);
            if have < wanted {
                return Err(ConfigurationError::PoolDeficit {
                    module_type,
                    missing: wanted.saturating_sub(have),
                });
            }
            picked.extend(ids.into_iter().take(usize::try_from(wanted).unwrap_or(usize::MAX)));
        }
        Ok(picked)
    }

    /// Remove the given modules from the pool.
    ///
    /// Nothing is removed if any id is missing.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::ModuleNotInPool`] for the first missing id.
    pub fn take(&mut self, ids: &[ModuleId]) -> Result<Vec<Module>, ConfigurationError> {
        if let Some(&missing) = ids.iter().find(|id| !self.modules.contains_key(id)) {
            return Err(ConfigurationError::ModuleNotInPool(missing));
        }
        Ok(ids
            .iter()
            .filter_map(|id| self.modules.remove(id))
            .collect())
    }

    /// Return modules to the pool. Out-of-service modules are discarded.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::DuplicateModule`] if a module is already pooled.
    /// Modules before the duplicate stay in the pool.
    pub fn put(&mut self, modules: impl IntoIterator<Item = Module>) -> Result<(), ConfigurationError> {
        for module in modules {
            if !module.in_service() {
                continue;
            }
            if self.modules.contains_key(&module.id) {
                return Err(ConfigurationError::DuplicateModule(module.id));
            }
            self.modules.insert(module.id, module);
        }
        Ok(())
    }

    /// Pooled modules in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pool() -> ModulePool {
        ModulePool::from_modules([
            Module::new(ModuleId::new(3), ModuleType::Body),
            Module::new(ModuleId::new(1), ModuleType::Body),
            Module::new(ModuleId::new(2), ModuleType::Wheel),
        ])
        .unwrap()
    }

    #[test]
    fn select_prefers_lowest_ids() {
        let p = pool();
        let request = BTreeMap::from([(ModuleType::Body, 1)]);
        assert_eq!(p.select(&request).unwrap(), vec![ModuleId::new(1)]);
    }

    #[test]
    fn select_reports_deficit() {
        let p = pool();
        let request = BTreeMap::from([(ModuleType::Limb, 2)]);
        assert_eq!(
            p.select(&request),
            Err(ConfigurationError::PoolDeficit {
                module_type: ModuleType::Limb,
                missing: 2
            })
        );
        assert!(!p.can_cover(&request));
    }

    #[test]
    fn take_is_all_or_nothing() {
        let mut p = pool();
        let err = p.take(&[ModuleId::new(1), ModuleId::new(9)]).unwrap_err();
        assert_eq!(err, ConfigurationError::ModuleNotInPool(ModuleId::new(9)));
        assert_eq!(p.len(), 3);
        let taken = p.take(&[ModuleId::new(1), ModuleId::new(2)]).unwrap();
        assert_eq!(taken.len(), 2);
        assert_eq!(p.len(), 1);
    }

    #[test]
    fn put_discards_failed_and_rejects_duplicates() {
        let mut p = pool();
        let mut broken = Module::new(ModuleId::new(7), ModuleType::Limb);
        broken.health = 0.0;
        p.put([broken]).unwrap();
        assert!(!p.contains(ModuleId::new(7)));
        assert_eq!(
            p.put([Module::new(ModuleId::new(1), ModuleType::Body)]),
            Err(ConfigurationError::DuplicateModule(ModuleId::new(1)))
        );
    }

    #[test]
    fn counts_by_type() {
        let counts = pool().counts();
        assert_eq!(counts.get(&ModuleType::Body), Some(&2));
        assert_eq!(counts.get(&ModuleType::Wheel), Some(&1));
        assert_eq!(counts.get(&ModuleType::Limb), None);
    }
}
