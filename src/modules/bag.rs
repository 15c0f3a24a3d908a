//! Item inventory

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{RealmError, Result};
use crate::modules::{read_state, write_state, ActorContext, Module};

const MODULE_NAME: &str = "bag";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BagModule {
    items: BTreeMap<u32, u64>,
}

impl BagModule {
    /// Add `amount` of an item; returns the new count
    pub fn add_item(&mut self, item: u32, amount: u64) -> u64 {
        let count = self.items.entry(item).or_insert(0);
        *count = count.saturating_add(amount);
        *count
    }

    /// Take `amount` of an item out; returns what is left
    pub fn remove_item(&mut self, item: u32, amount: u64) -> Result<u64> {
        let Some(count) = self.items.get_mut(&item) else {
            return Err(RealmError::NotFound(format!("item {}", item)));
        };
        if *count < amount {
            return Err(RealmError::Handler(format!(
                "not enough of item {}: have {}, need {}",
                item, count, amount
            )));
        }
        *count -= amount;
        let left = *count;
        if left == 0 {
            self.items.remove(&item);
        }
        Ok(left)
    }

    pub fn count(&self, item: u32) -> u64 {
        self.items.get(&item).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> impl Iterator<Item = (u32, u64)> + '_ {
        self.items.iter().map(|(&item, &count)| (item, count))
    }

    /// Text reply for the bag command
    pub fn describe(&self) -> String {
        if self.items.is_empty() {
            return "bag is empty".to_string();
        }
        let entries: Vec<String> = self
            .items()
            .map(|(item, count)| format!("{} x{}", item, count))
            .collect();
        format!("bag: {}", entries.join(", "))
    }
}

#[async_trait]
impl Module for BagModule {
    fn name(&self) -> &'static str {
        MODULE_NAME
    }

    fn init(&mut self, _ctx: &ActorContext) {
        self.items.clear();
    }

    async fn load(&mut self, ctx: &ActorContext) -> Result<()> {
        match read_state::<Self>(ctx, MODULE_NAME).await? {
            Some(saved) => *self = saved,
            None => self.init(ctx),
        }
        Ok(())
    }

    async fn save(&self, ctx: &ActorContext) -> Result<()> {
        write_state(ctx, MODULE_NAME, self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_remove() {
        let mut bag = BagModule::default();
        assert_eq!(bag.add_item(7, 3), 3);
        assert_eq!(bag.add_item(7, 2), 5);
        assert_eq!(bag.remove_item(7, 4).unwrap(), 1);
        assert_eq!(bag.count(7), 1);
        assert_eq!(bag.remove_item(7, 1).unwrap(), 0);
        assert!(bag.is_empty());
    }

    #[test]
    fn test_remove_failures_leave_bag_untouched() {
        let mut bag = BagModule::default();
        assert!(matches!(bag.remove_item(1, 1), Err(RealmError::NotFound(_))));

        bag.add_item(1, 2);
        assert!(matches!(bag.remove_item(1, 3), Err(RealmError::Handler(_))));
        assert_eq!(bag.count(1), 2);
    }

    #[test]
    fn test_describe_lists_items_in_id_order() {
        let mut bag = BagModule::default();
        assert_eq!(bag.describe(), "bag is empty");
        bag.add_item(20, 1);
        bag.add_item(3, 9);
        assert_eq!(bag.describe(), "bag: 3 x9, 20 x1");
    }
}
