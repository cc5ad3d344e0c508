use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ids::ModuleKey;

/// Atomic unit of permission within a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Select,
        Operation::Insert,
        Operation::Update,
        Operation::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Select => "select",
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown operation: {0}")]
pub struct UnknownOperation(pub String);

impl FromStr for Operation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownOperation(s.to_string()))
    }
}

/// A set of operations. Duplicates collapse on insert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationSet(BTreeSet<Operation>);

impl OperationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, op: Operation) -> bool {
        self.0.insert(op)
    }

    pub fn contains(&self, op: Operation) -> bool {
        self.0.contains(&op)
    }

    pub fn union_with(&mut self, other: &OperationSet) {
        self.0.extend(other.0.iter().copied());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Operation> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Operation> for OperationSet {
    fn from_iter<I: IntoIterator<Item = Operation>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[Operation; N]> for OperationSet {
    fn from(ops: [Operation; N]) -> Self {
        ops.into_iter().collect()
    }
}

impl fmt::Display for OperationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(Operation::as_str).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// Module key to granted operations. Modules with no operations are never
/// stored, so an absent key and an empty set mean the same thing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionMap(BTreeMap<ModuleKey, OperationSet>);

impl PermissionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&mut self, module: &ModuleKey, ops: &OperationSet) {
        if ops.is_empty() {
            return;
        }
        self.0.entry(module.clone()).or_default().union_with(ops);
    }

    pub fn merge(&mut self, other: &PermissionMap) {
        for (module, ops) in &other.0 {
            self.grant(module, ops);
        }
    }

    pub fn get(&self, module: &str) -> Option<&OperationSet> {
        self.0.get(module)
    }

    pub fn allows(&self, module: &str, op: Operation) -> bool {
        self.get(module).is_some_and(|ops| ops.contains(op))
    }

    /// Keeps only modules accepted by `keep`.
    pub fn retain_modules(&mut self, mut keep: impl FnMut(&ModuleKey) -> bool) {
        self.0.retain(|module, _| keep(module));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleKey> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ModuleKey, &OperationSet)> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a PermissionMap {
    type Item = (&'a ModuleKey, &'a OperationSet);
    type IntoIter = std::collections::btree_map::Iter<'a, ModuleKey, OperationSet>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> ModuleKey {
        ModuleKey::parse(raw).unwrap()
    }

    #[test]
    fn operation_parses_case_insensitively() {
        assert_eq!("SELECT".parse::<Operation>().unwrap(), Operation::Select);
        assert_eq!("Delete".parse::<Operation>().unwrap(), Operation::Delete);
    }

    #[test]
    fn operation_rejects_unknown_name() {
        let err = "truncate".parse::<Operation>().unwrap_err();
        assert_eq!(err.to_string(), "unknown operation: truncate");
    }

    #[test]
    fn operation_serializes_lowercase() {
        let json = serde_json::to_string(&Operation::Update).unwrap();
        assert_eq!(json, "\"update\"");
    }

    #[test]
    fn operation_set_collapses_duplicates() {
        let set: OperationSet = [Operation::Select, Operation::Select, Operation::Insert].into();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn operation_set_display_is_sorted() {
        let set: OperationSet = [Operation::Delete, Operation::Select].into();
        assert_eq!(set.to_string(), "{select, delete}");
    }

    #[test]
    fn grant_unions_per_module() {
        let mut map = PermissionMap::new();
        map.grant(&key("coupons"), &[Operation::Select].into());
        map.grant(&key("coupons"), &[Operation::Insert, Operation::Select].into());

        let ops = map.get("coupons").unwrap();
        assert_eq!(ops.len(), 2);
        assert!(ops.contains(Operation::Insert));
    }

    #[test]
    fn grant_skips_empty_sets() {
        let mut map = PermissionMap::new();
        map.grant(&key("coupons"), &OperationSet::new());

        assert!(map.is_empty());
    }

    #[test]
    fn merge_is_union() {
        let mut a = PermissionMap::new();
        a.grant(&key("coupons"), &[Operation::Select].into());
        let mut b = PermissionMap::new();
        b.grant(&key("coupons"), &[Operation::Update].into());
        b.grant(&key("dashboard"), &[Operation::Select].into());

        a.merge(&b);

        assert!(a.allows("coupons", Operation::Select));
        assert!(a.allows("coupons", Operation::Update));
        assert!(a.allows("dashboard", Operation::Select));
        assert!(!a.allows("dashboard", Operation::Delete));
    }

    #[test]
    fn retain_modules_drops_filtered_keys() {
        let mut map = PermissionMap::new();
        map.grant(&key("coupons"), &[Operation::Select].into());
        map.grant(&key("dashboard"), &[Operation::Select].into());

        map.retain_modules(|m| m.as_str() == "dashboard");

        assert_eq!(map.len(), 1);
        assert!(map.get("coupons").is_none());
    }

    #[test]
    fn permission_map_serializes_as_object() {
        let mut map = PermissionMap::new();
        map.grant(&key("coupons"), &[Operation::Insert, Operation::Select].into());

        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(json, serde_json::json!({ "coupons": ["select", "insert"] }));
    }
}
