//! Foreign-key ordering of tables.
//!
//! Tables are ordered so that referenced tables come before the tables that
//! reference them, ties broken by name. Foreign keys are added after the copy,
//! so a cycle never blocks the run; tables that cannot be ordered are appended
//! in name order and the ones on a cycle are reported.

use crate::models::{ConstraintKind, TableConstraint};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableOrder {
    /// Every input table exactly once
    pub tables: Vec<String>,
    /// Tables taking part in a foreign-key cycle, by name
    pub cyclic: Vec<String>,
}

/// Order `tables` by the "references" relation found in `constraints`.
///
/// Self references and references to tables outside the set are ignored.
pub fn order_tables(tables: &[String], constraints: &[TableConstraint]) -> TableOrder {
    let names: BTreeSet<&str> = tables.iter().map(String::as_str).collect();

    // table -> tables it references
    let mut depends_on: BTreeMap<&str, BTreeSet<&str>> =
        names.iter().map(|&t| (t, BTreeSet::new())).collect();
    // table -> tables referencing it
    let mut referenced_by: BTreeMap<&str, BTreeSet<&str>> =
        names.iter().map(|&t| (t, BTreeSet::new())).collect();

    for constraint in constraints
        .iter()
        .filter(|c| c.kind == ConstraintKind::ForeignKey)
    {
        let Some(referenced) = constraint.local_reference() else {
            continue;
        };
        let owner = constraint.table_name.as_str();
        if !names.contains(owner) || !names.contains(referenced) {
            continue;
        }
        if let Some(deps) = depends_on.get_mut(owner) {
            deps.insert(referenced);
        }
        if let Some(refs) = referenced_by.get_mut(referenced) {
            refs.insert(owner);
        }
    }

    let mut pending: BTreeMap<&str, usize> =
        depends_on.iter().map(|(&t, d)| (t, d.len())).collect();
    let mut ready: BTreeSet<&str> = pending
        .iter()
        .filter(|&(_, &n)| n == 0)
        .map(|(&t, _)| t)
        .collect();
    let mut ordered = Vec::with_capacity(names.len());

    while let Some(table) = ready.pop_first() {
        pending.remove(table);
        ordered.push(table.to_string());
        for &dependent in &referenced_by[table] {
            if let Some(count) = pending.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(dependent);
                }
            }
        }
    }

    let mut remaining: BTreeSet<&str> = pending.keys().copied().collect();
    ordered.extend(remaining.iter().map(|t| t.to_string()));

    // Peel off tables that only hang off a cycle (nothing left references them)
    loop {
        let leaves: Vec<&str> = remaining
            .iter()
            .copied()
            .filter(|t| referenced_by[t].iter().all(|r| !remaining.contains(r)))
            .collect();
        if leaves.is_empty() {
            break;
        }
        for leaf in leaves {
            remaining.remove(leaf);
        }
    }

    TableOrder {
        tables: ordered,
        cyclic: remaining.into_iter().map(String::from).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fk(table: &str, referenced: &str) -> TableConstraint {
        TableConstraint::new(
            format!("{table}_{referenced}_fkey"),
            "public",
            table,
            ConstraintKind::ForeignKey,
            format!("FOREIGN KEY (x) REFERENCES {referenced}(id)"),
        )
        .with_reference("public", referenced)
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_no_constraints_orders_by_name() {
        let order = order_tables(&names(&["users", "items", "orders"]), &[]);
        assert_eq!(order.tables, names(&["items", "orders", "users"]));
        assert!(order.cyclic.is_empty());
    }

    #[test]
    fn test_referenced_tables_first() {
        let constraints = vec![fk("orders", "users"), fk("orders", "items"), fk("items", "users")];
        let order = order_tables(&names(&["orders", "items", "users"]), &constraints);
        assert_eq!(order.tables, names(&["users", "items", "orders"]));
        assert!(order.cyclic.is_empty());
    }

    #[test]
    fn test_self_reference_ignored() {
        let order = order_tables(&names(&["nodes"]), &[fk("nodes", "nodes")]);
        assert_eq!(order.tables, names(&["nodes"]));
        assert!(order.cyclic.is_empty());
    }

    #[test]
    fn test_reference_outside_set_ignored() {
        let order = order_tables(&names(&["orders"]), &[fk("orders", "users")]);
        assert_eq!(order.tables, names(&["orders"]));
    }

    #[test]
    fn test_cycle_detected() {
        let constraints = vec![fk("a", "b"), fk("b", "a"), fk("c", "a"), fk("a", "root")];
        let order = order_tables(&names(&["a", "b", "c", "root"]), &constraints);
        assert_eq!(order.tables.len(), 4);
        assert_eq!(order.tables[0], "root");
        assert_eq!(order.cyclic, names(&["a", "b"]));
    }

    #[test]
    fn test_non_foreign_keys_ignored() {
        let unique = TableConstraint::new(
            "users_email_key",
            "public",
            "users",
            ConstraintKind::Unique,
            "UNIQUE (email)",
        );
        let order = order_tables(&names(&["users"]), &[unique]);
        assert_eq!(order.tables, names(&["users"]));
    }
}
