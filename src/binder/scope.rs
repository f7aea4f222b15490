// Name resolution over the FROM bindings of one SELECT

use crate::binder::expr::{BoundExpr, ColumnRef, TableRef};
use crate::error::{DbError, Result};
use crate::sql::ast::ObjectName;
use crate::types::DataType;

#[derive(Debug, Clone)]
struct ScopeTable {
    table_ref: TableRef,
    name: ObjectName,
    alias: Option<String>,
    columns: Vec<(String, DataType)>,
}

impl ScopeTable {
    /// Name shown in rendered column references.
    fn qualifier(&self) -> String {
        match &self.alias {
            Some(alias) => alias.clone(),
            None => self.name.to_string(),
        }
    }

    /// An aliased table is only visible through its alias; otherwise the full
    /// dotted name or its last part qualifies it.
    fn matches(&self, qualifier: &ObjectName) -> bool {
        match &self.alias {
            Some(alias) => qualifier.0.len() == 1 && &qualifier.0[0] == alias,
            None => {
                *qualifier == self.name
                    || (qualifier.0.len() == 1 && self.name.0.last() == Some(&qualifier.0[0]))
            }
        }
    }

    fn column_expr(&self, index: usize) -> BoundExpr {
        let (name, data_type) = &self.columns[index];
        BoundExpr::Column {
            column: ColumnRef {
                table: self.table_ref,
                column: index,
            },
            data_type: *data_type,
            name: format!("{}.{}", self.qualifier(), name),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scope {
    tables: Vec<ScopeTable>,
}

impl Scope {
    pub fn add_table(
        &mut self,
        table_ref: TableRef,
        name: ObjectName,
        alias: Option<String>,
        columns: Vec<(String, DataType)>,
    ) -> Result<()> {
        let entry = ScopeTable {
            table_ref,
            name,
            alias,
            columns,
        };
        let qualifier = entry.qualifier();
        if self.tables.iter().any(|t| t.qualifier() == qualifier) {
            return Err(DbError::InvalidName(format!(
                "table name '{qualifier}' specified more than once"
            )));
        }
        self.tables.push(entry);
        Ok(())
    }

    fn tables_matching(&self, qualifier: &ObjectName) -> Result<&ScopeTable> {
        let mut matches = self.tables.iter().filter(|t| t.matches(qualifier));
        let first = matches
            .next()
            .ok_or_else(|| DbError::UnknownTable(qualifier.to_string()))?;
        if matches.next().is_some() {
            return Err(DbError::AmbiguousColumn(format!(
                "table reference '{qualifier}' matches more than one table"
            )));
        }
        Ok(first)
    }

    /// Resolve a possibly qualified column name.
    pub fn resolve(&self, qualifier: Option<&ObjectName>, name: &str) -> Result<BoundExpr> {
        if let Some(qualifier) = qualifier {
            let table = self.tables_matching(qualifier)?;
            let index = table
                .columns
                .iter()
                .position(|(n, _)| n == name)
                .ok_or_else(|| DbError::UnknownColumn(format!("{qualifier}.{name}")))?;
            return Ok(table.column_expr(index));
        }

        let mut found = None;
        for table in &self.tables {
            if let Some(index) = table.columns.iter().position(|(n, _)| n == name) {
                if found.is_some() {
                    return Err(DbError::AmbiguousColumn(name.to_string()));
                }
                found = Some(table.column_expr(index));
            }
        }
        found.ok_or_else(|| DbError::UnknownColumn(name.to_string()))
    }

    /// Expand `*` (every table, in FROM order) or `t.*`.
    pub fn expand_wildcard(
        &self,
        qualifier: Option<&ObjectName>,
    ) -> Result<Vec<(BoundExpr, String)>> {
        let tables: Vec<&ScopeTable> = match qualifier {
            Some(qualifier) => vec![self.tables_matching(qualifier)?],
            None => self.tables.iter().collect(),
        };
        Ok(tables
            .into_iter()
            .flat_map(|table| {
                table
                    .columns
                    .iter()
                    .enumerate()
                    .map(move |(idx, (name, _))| (table.column_expr(idx), name.clone()))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(parts: &[&str]) -> ObjectName {
        ObjectName(parts.iter().map(|p| p.to_string()).collect())
    }

    fn scope() -> Scope {
        let mut scope = Scope::default();
        scope
            .add_table(
                TableRef(0),
                name(&["sys", "dual"]),
                None,
                vec![("a".into(), DataType::Int64), ("b".into(), DataType::Text)],
            )
            .unwrap();
        scope
            .add_table(
                TableRef(1),
                name(&["u"]),
                Some("x".into()),
                vec![("a".into(), DataType::Int64), ("c".into(), DataType::Boolean)],
            )
            .unwrap();
        scope
    }

    #[test]
    fn test_unqualified_resolution() {
        let scope = scope();
        let expr = scope.resolve(None, "c").unwrap();
        assert_eq!(expr.to_string(), "x.c");
        assert!(matches!(
            scope.resolve(None, "a").unwrap_err(),
            DbError::AmbiguousColumn(_)
        ));
        assert!(matches!(
            scope.resolve(None, "zz").unwrap_err(),
            DbError::UnknownColumn(name) if name == "zz"
        ));
    }

    #[test]
    fn test_qualified_resolution() {
        let scope = scope();
        assert!(scope.resolve(Some(&name(&["dual"])), "a").is_ok());
        assert!(scope.resolve(Some(&name(&["sys", "dual"])), "b").is_ok());
        // Aliased tables are only reachable through the alias.
        assert!(matches!(
            scope.resolve(Some(&name(&["u"])), "a").unwrap_err(),
            DbError::UnknownTable(_)
        ));
        assert!(matches!(
            scope.resolve(Some(&name(&["x"])), "b").unwrap_err(),
            DbError::UnknownColumn(_)
        ));
    }

    #[test]
    fn test_wildcards() {
        let scope = scope();
        let all = scope.expand_wildcard(None).unwrap();
        let names: Vec<&str> = all.iter().map(|(_, n)| n.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "a", "c"]);
        assert_eq!(scope.expand_wildcard(Some(&name(&["x"]))).unwrap().len(), 2);
    }

    #[test]
    fn test_duplicate_binding_rejected() {
        let mut scope = scope();
        let err = scope
            .add_table(TableRef(2), name(&["other"]), Some("x".into()), vec![])
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidName(_)));
    }
}
