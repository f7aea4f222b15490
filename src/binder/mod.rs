//! Binder: resolves an AST against the catalog.
//!
//! Every identifier is resolved to a `(table reference, column index)` pair,
//! every expression gets a concrete type, and aggregate queries are rewritten
//! so that expressions above the aggregation only reference its group keys
//! and aggregate outputs. Table snapshots are taken here, which fixes the
//! data a query will observe.

mod bind_expr;
pub mod expr;
mod scope;

pub use expr::{AggregateFunction, BoundAggregate, BoundExpr, ColumnRef, Subquery, TableRef};

use crate::catalog::{Catalog, Column, Schema, TableSnapshot};
use crate::error::{DbError, Result};
use crate::sql::ast::{self, Expr, Select, SelectItem, Statement};
use crate::types::ScalarValue;

use bind_expr::ExprContext;
use scope::Scope;

#[derive(Debug, Clone)]
pub enum BoundStatement {
    Select(BoundSelect),
    Insert(BoundInsert),
    CreateTable(BoundCreateTable),
    Explain(Box<BoundStatement>),
}

/// A FROM binding with the table contents it will read.
#[derive(Debug, Clone)]
pub struct BoundTable {
    pub table_ref: TableRef,
    /// Alias or table name, as shown by EXPLAIN.
    pub name: String,
    pub snapshot: TableSnapshot,
}

/// Group keys and aggregates of an aggregate query.
///
/// Expressions above the aggregation reference group key `i` as
/// `(group_ref, i)` and aggregate `j` as `(agg_ref, j)`.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundAggregation {
    pub group_ref: TableRef,
    pub group_exprs: Vec<BoundExpr>,
    pub agg_ref: TableRef,
    pub aggregates: Vec<BoundAggregate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundOrderBy {
    pub expr: BoundExpr,
    pub ascending: bool,
}

#[derive(Debug, Clone)]
pub struct BoundSelect {
    pub tables: Vec<BoundTable>,
    /// `JOIN ... ON` conditions, in FROM order.
    pub join_conditions: Vec<BoundExpr>,
    pub filter: Option<BoundExpr>,
    pub aggregation: Option<BoundAggregation>,
    pub having: Option<BoundExpr>,
    pub order_by: Vec<BoundOrderBy>,
    pub projection: Vec<BoundExpr>,
    pub output_names: Vec<String>,
    /// Reference for the projection's output columns.
    pub output_ref: TableRef,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct BoundInsert {
    pub table: String,
    pub columns: Vec<String>,
    /// Constant expressions, one row per entry.
    pub rows: Vec<Vec<BoundExpr>>,
}

#[derive(Debug, Clone)]
pub struct BoundCreateTable {
    pub name: String,
    pub if_not_exists: bool,
    pub schema: Schema,
}

pub struct Binder<'a> {
    catalog: &'a Catalog,
    next_table_ref: usize,
}

impl<'a> Binder<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            next_table_ref: 0,
        }
    }

    fn new_table_ref(&mut self) -> TableRef {
        let table_ref = TableRef(self.next_table_ref);
        self.next_table_ref += 1;
        table_ref
    }

    pub fn bind_statement(&mut self, statement: &Statement) -> Result<BoundStatement> {
        match statement {
            Statement::Select(select) => Ok(BoundStatement::Select(self.bind_select(select)?)),
            Statement::Insert(insert) => Ok(BoundStatement::Insert(self.bind_insert(insert)?)),
            Statement::CreateTable(create) => {
                Ok(BoundStatement::CreateTable(bind_create_table(create)?))
            }
            Statement::Explain(inner) => Ok(BoundStatement::Explain(Box::new(
                self.bind_statement(inner)?,
            ))),
        }
    }

    fn bind_table(
        &mut self,
        table: &ast::TableRef,
        scope: &mut Scope,
        tables: &mut Vec<BoundTable>,
    ) -> Result<()> {
        let name = table.name.to_string();
        let snapshot = self.catalog.snapshot(&name)?;
        let table_ref = self.new_table_ref();
        let columns = snapshot
            .schema
            .columns()
            .iter()
            .map(|c| (c.name.clone(), c.data_type))
            .collect();
        scope.add_table(table_ref, table.name.clone(), table.alias.clone(), columns)?;
        tables.push(BoundTable {
            table_ref,
            name: table.alias.clone().unwrap_or(name),
            snapshot,
        });
        Ok(())
    }

    pub(crate) fn bind_select(&mut self, select: &Select) -> Result<BoundSelect> {
        let mut scope = Scope::default();
        let mut tables = Vec::new();
        let mut join_conditions = Vec::new();
        for from in &select.from {
            self.bind_table(&from.relation, &mut scope, &mut tables)?;
            for join in &from.joins {
                self.bind_table(&join.relation, &mut scope, &mut tables)?;
                join_conditions.push(self.bind_predicate(&join.on, &scope, ExprContext::JoinOn)?);
            }
        }

        let filter = select
            .selection
            .as_ref()
            .map(|expr| self.bind_predicate(expr, &scope, ExprContext::Where))
            .transpose()?;

        let group_exprs = select
            .group_by
            .iter()
            .map(|expr| self.bind_expr(expr, &scope, ExprContext::GroupBy))
            .collect::<Result<Vec<_>>>()?;

        let mut projection = Vec::new();
        let mut output_names = Vec::new();
        for item in &select.projection {
            match item {
                SelectItem::Wildcard => {
                    for (expr, name) in scope.expand_wildcard(None)? {
                        projection.push(expr);
                        output_names.push(name);
                    }
                }
                SelectItem::QualifiedWildcard(qualifier) => {
                    for (expr, name) in scope.expand_wildcard(Some(qualifier))? {
                        projection.push(expr);
                        output_names.push(name);
                    }
                }
                SelectItem::Expr { expr, alias } => {
                    projection.push(self.bind_expr(expr, &scope, ExprContext::Output)?);
                    output_names.push(match (alias, expr) {
                        (Some(alias), _) => alias.clone(),
                        (None, Expr::Column { name, .. }) => name.clone(),
                        (None, other) => other.to_string(),
                    });
                }
            }
        }

        let mut having = select
            .having
            .as_ref()
            .map(|expr| self.bind_predicate(expr, &scope, ExprContext::Output))
            .transpose()?;

        let mut order_by = Vec::with_capacity(select.order_by.len());
        for item in &select.order_by {
            let expr = self.bind_order_by_expr(&item.expr, &scope, &projection, &output_names)?;
            order_by.push(BoundOrderBy {
                expr,
                ascending: item.ascending,
            });
        }

        let aggregated = !group_exprs.is_empty()
            || having.is_some()
            || projection.iter().any(BoundExpr::contains_aggregate)
            || order_by.iter().any(|o| o.expr.contains_aggregate());

        let aggregation = if aggregated {
            let mut aggregation = BoundAggregation {
                group_ref: self.new_table_ref(),
                group_exprs,
                agg_ref: self.new_table_ref(),
                aggregates: Vec::new(),
            };
            projection = projection
                .into_iter()
                .map(|expr| rewrite_aggregated(expr, &mut aggregation))
                .collect::<Result<_>>()?;
            having = having
                .map(|expr| rewrite_aggregated(expr, &mut aggregation))
                .transpose()?;
            order_by = order_by
                .into_iter()
                .map(|o| {
                    Ok(BoundOrderBy {
                        expr: rewrite_aggregated(o.expr, &mut aggregation)?,
                        ascending: o.ascending,
                    })
                })
                .collect::<Result<_>>()?;
            Some(aggregation)
        } else {
            None
        };

        Ok(BoundSelect {
            tables,
            join_conditions,
            filter,
            aggregation,
            having,
            order_by,
            projection,
            output_names,
            output_ref: self.new_table_ref(),
            limit: select.limit,
            offset: select.offset,
        })
    }

    /// ORDER BY accepts a 1-based select-list ordinal, a select-list output
    /// name, or any expression over the input.
    fn bind_order_by_expr(
        &mut self,
        expr: &Expr,
        scope: &Scope,
        projection: &[BoundExpr],
        output_names: &[String],
    ) -> Result<BoundExpr> {
        match expr {
            Expr::Literal(ScalarValue::Int64(position)) => {
                let index = usize::try_from(*position)
                    .ok()
                    .filter(|p| (1..=projection.len()).contains(p))
                    .ok_or_else(|| {
                        DbError::UnknownColumn(format!(
                            "ORDER BY position {position} is not in the select list"
                        ))
                    })?;
                Ok(projection[index - 1].clone())
            }
            Expr::Column { table: None, name } => {
                let mut matches = output_names
                    .iter()
                    .zip(projection)
                    .filter(|(output, _)| *output == name)
                    .map(|(_, expr)| expr);
                match matches.next() {
                    Some(first) => {
                        if matches.any(|other| other != first) {
                            return Err(DbError::AmbiguousColumn(name.clone()));
                        }
                        Ok(first.clone())
                    }
                    None => self.bind_expr(expr, scope, ExprContext::Output),
                }
            }
            _ => self.bind_expr(expr, scope, ExprContext::Output),
        }
    }

    fn bind_insert(&mut self, insert: &ast::Insert) -> Result<BoundInsert> {
        let name = insert.table.to_string();
        let table = self.catalog.lookup(&name)?;
        for column in &insert.columns {
            if table.schema().index_of(column).is_none() {
                return Err(DbError::UnknownColumn(format!("{name}.{column}")));
            }
        }
        let scope = Scope::default();
        let rows = insert
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|expr| self.bind_expr(expr, &scope, ExprContext::Values))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(BoundInsert {
            table: name,
            columns: insert.columns.clone(),
            rows,
        })
    }
}

fn bind_create_table(create: &ast::CreateTable) -> Result<BoundCreateTable> {
    let columns = create
        .columns
        .iter()
        .map(|def| Column {
            name: def.name.clone(),
            data_type: def.data_type,
            nullable: def.nullable,
        })
        .collect();
    Ok(BoundCreateTable {
        name: create.name.to_string(),
        if_not_exists: create.if_not_exists,
        schema: Schema::try_new(columns)?,
    })
}

/// Rewrite an output expression of an aggregate query in terms of the
/// aggregation's group keys and aggregate outputs.
fn rewrite_aggregated(expr: BoundExpr, aggregation: &mut BoundAggregation) -> Result<BoundExpr> {
    if let Some(index) = aggregation.group_exprs.iter().position(|g| *g == expr) {
        return Ok(BoundExpr::Column {
            column: ColumnRef {
                table: aggregation.group_ref,
                column: index,
            },
            data_type: expr.data_type(),
            name: expr.to_string(),
        });
    }
    match expr {
        BoundExpr::Aggregate(aggregate) => {
            let index = match aggregation.aggregates.iter().position(|a| *a == *aggregate) {
                Some(index) => index,
                None => {
                    aggregation.aggregates.push((*aggregate).clone());
                    aggregation.aggregates.len() - 1
                }
            };
            Ok(BoundExpr::Column {
                column: ColumnRef {
                    table: aggregation.agg_ref,
                    column: index,
                },
                data_type: aggregate.data_type,
                name: aggregate.to_string(),
            })
        }
        BoundExpr::Column { name, .. } => Err(DbError::InvalidGroupBy(format!(
            "column {name} must appear in GROUP BY or be used in an aggregate"
        ))),
        other => other.map_children(|child| rewrite_aggregated(child, aggregation)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::parse;
    use crate::types::DataType;

    fn catalog() -> Catalog {
        let catalog = Catalog::new();
        catalog
            .define(
                "t",
                Schema::try_new(vec![
                    Column::new("a", DataType::Int64),
                    Column::new("b", DataType::Int64),
                    Column::new("s", DataType::Text),
                ])
                .unwrap(),
            )
            .unwrap();
        catalog
            .define(
                "u",
                Schema::try_new(vec![
                    Column::new("a", DataType::Int64),
                    Column::new("price", DataType::decimal(8, 2).unwrap()),
                ])
                .unwrap(),
            )
            .unwrap();
        catalog
    }

    fn bind(sql: &str) -> Result<BoundSelect> {
        let catalog = catalog();
        let statement = parse(sql)?;
        match Binder::new(&catalog).bind_statement(&statement)? {
            BoundStatement::Select(select) => Ok(select),
            other => panic!("expected select, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_column_is_named() {
        let err = bind("SELECT c FROM t").unwrap_err();
        assert!(matches!(err, DbError::UnknownColumn(name) if name == "c"));
    }

    #[test]
    fn test_unknown_table() {
        assert!(matches!(
            bind("SELECT a FROM missing").unwrap_err(),
            DbError::UnknownTable(_)
        ));
    }

    #[test]
    fn test_ambiguous_column() {
        assert!(matches!(
            bind("SELECT a FROM t, u").unwrap_err(),
            DbError::AmbiguousColumn(_)
        ));
        assert!(bind("SELECT t.a, u.a FROM t, u").is_ok());
    }

    #[test]
    fn test_output_names() {
        let select = bind("SELECT a, b AS bee, a + 1, x.* FROM t x").unwrap();
        assert_eq!(
            select.output_names,
            vec!["a", "bee", "a + 1", "a", "b", "s"]
        );
        assert_eq!(select.projection[2].data_type(), DataType::Int64);
    }

    #[test]
    fn test_where_must_be_boolean() {
        assert!(matches!(
            bind("SELECT a FROM t WHERE a + 1").unwrap_err(),
            DbError::TypeMismatch(_)
        ));
        assert!(matches!(
            bind("SELECT a FROM t WHERE s > 'x'").unwrap_err(),
            DbError::TypeMismatch(_)
        ));
    }

    #[test]
    fn test_aggregates_are_extracted() {
        let select = bind("SELECT b, SUM(a), COUNT(*) FROM t GROUP BY b HAVING SUM(a) > 1").unwrap();
        let aggregation = select.aggregation.unwrap();
        assert_eq!(aggregation.group_exprs.len(), 1);
        // SUM(a) in SELECT and HAVING is computed once.
        assert_eq!(aggregation.aggregates.len(), 2);
        assert!(select.projection.iter().all(|e| !e.contains_aggregate()));
        assert!(select.having.is_some());
    }

    #[test]
    fn test_invalid_group_by() {
        assert!(matches!(
            bind("SELECT a, COUNT(*) FROM t").unwrap_err(),
            DbError::InvalidGroupBy(_)
        ));
        assert!(matches!(
            bind("SELECT a FROM t GROUP BY b").unwrap_err(),
            DbError::InvalidGroupBy(_)
        ));
        assert!(matches!(
            bind("SELECT a FROM t WHERE SUM(a) > 1").unwrap_err(),
            DbError::InvalidGroupBy(_)
        ));
        assert!(matches!(
            bind("SELECT SUM(MAX(a)) FROM t").unwrap_err(),
            DbError::InvalidGroupBy(_)
        ));
        assert!(bind("SELECT b + 1, COUNT(a) FROM t GROUP BY b + 1").is_ok());
    }

    #[test]
    fn test_order_by_alias_ordinal_and_expression() {
        let select = bind("SELECT a AS x, b FROM t ORDER BY x DESC, 2, a + b").unwrap();
        assert_eq!(select.order_by.len(), 3);
        assert_eq!(select.order_by[0].expr, select.projection[0]);
        assert!(!select.order_by[0].ascending);
        assert_eq!(select.order_by[1].expr, select.projection[1]);
        assert!(matches!(
            bind("SELECT a FROM t ORDER BY 3").unwrap_err(),
            DbError::UnknownColumn(_)
        ));
    }

    #[test]
    fn test_in_subquery_shape() {
        assert!(bind("SELECT a FROM t WHERE a IN (SELECT a FROM u)").is_ok());
        assert!(matches!(
            bind("SELECT a FROM t WHERE a IN (SELECT a, price FROM u)").unwrap_err(),
            DbError::TypeMismatch(_)
        ));
        assert!(matches!(
            bind("SELECT a FROM t WHERE s IN (SELECT a FROM u)").unwrap_err(),
            DbError::TypeMismatch(_)
        ));
    }

    #[test]
    fn test_join_on_binds_against_joined_tables() {
        let select = bind("SELECT t.a FROM t JOIN u ON t.a = u.a WHERE u.price > 1").unwrap();
        assert_eq!(select.tables.len(), 2);
        assert_eq!(select.join_conditions.len(), 1);
        assert_ne!(select.tables[0].table_ref, select.tables[1].table_ref);
    }

    #[test]
    fn test_insert_and_create_binding() {
        let catalog = catalog();
        let mut binder = Binder::new(&catalog);
        let statement = parse("INSERT INTO t (a, zz) VALUES (1, 2)").unwrap();
        assert!(matches!(
            binder.bind_statement(&statement).unwrap_err(),
            DbError::UnknownColumn(_)
        ));
        let statement = parse("CREATE TABLE n (x INT, x TEXT)").unwrap();
        assert!(matches!(
            binder.bind_statement(&statement).unwrap_err(),
            DbError::InvalidName(_)
        ));
    }
}
