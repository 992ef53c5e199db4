//! Database node.
//!
//! Resource and operation are selected by parameters and dispatched through
//! [`Resource`]. Queries are built here and handed to a host-provided
//! [`QueryExecutor`], which owns the connection.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use tracing::debug;
use weft_workflow::{
    ExecutionContext, InputPin, Item, ItemOperation, JsonObject, NodeDescription, NodeError,
    NodeOutput, NodeType, OutputPin, ParameterKind, ParameterSpec, run_per_item,
};

pub const TYPE_NAME: &str = "weft.database";

/// Default row limit when `returnAll` is off.
const DEFAULT_LIMIT: u64 = 50;

/// A SQL statement with `$n` placeholders and the values bound to them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlQuery {
    pub text: String,
    pub values: Vec<JsonValue>,
}

impl SqlQuery {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            values: Vec::new(),
        }
    }

    /// Binds a value and returns its placeholder.
    fn bind(&mut self, value: JsonValue) -> String {
        self.values.push(value);
        format!("${}", self.values.len())
    }
}

/// Runs queries against the host's database.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Executes `query` and returns the resulting rows.
    async fn query(&self, query: &SqlQuery) -> Result<Vec<JsonObject>, NodeError>;
}

/// Operations on the `database` resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DatabaseOperation {
    /// Select rows from a table.
    Select,
    /// Run the `query` parameter as is.
    ExecuteQuery,
}

/// The resource and operation a node invocation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "resource", content = "operation", rename_all = "camelCase")]
pub enum Resource {
    Database(DatabaseOperation),
}

impl Resource {
    /// Reads `resource` and `operation` from the node parameters.
    ///
    /// # Errors
    ///
    /// Returns an error naming the operation if the pair is unknown.
    pub fn from_parameters(parameters: &JsonObject) -> Result<Self, NodeError> {
        let resource = parameters.get("resource").cloned().unwrap_or(JsonValue::Null);
        let operation = parameters.get("operation").cloned().unwrap_or(JsonValue::Null);
        serde_json::from_value(json!({ "resource": resource, "operation": operation })).map_err(
            |_| {
                let operation = operation.as_str().map_or_else(|| operation.to_string(), str::to_string);
                NodeError::new(format!("The operation \"{operation}\" is not supported!"))
            },
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Condition {
    #[serde(rename = "equal", alias = "=")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = "IS NULL")]
    IsNull,
}

impl Condition {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::Like => "LIKE",
            Self::Greater => ">",
            Self::Less => "<",
            Self::GreaterOrEqual => ">=",
            Self::LessOrEqual => "<=",
            Self::IsNull => "IS NULL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WhereClause {
    pub column: String,
    pub condition: Condition,
    #[serde(default)]
    pub value: JsonValue,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Combinator {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SortRule {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// Quotes an identifier, doubling embedded quotes.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Appends a `WHERE` clause binding each value. `IS NULL` binds nothing.
pub fn add_where_clauses(query: &mut SqlQuery, clauses: &[WhereClause], combinator: Combinator) {
    if clauses.is_empty() {
        return;
    }
    let joiner = match combinator {
        Combinator::And => " AND ",
        Combinator::Or => " OR ",
    };
    let conditions: Vec<String> = clauses
        .iter()
        .map(|clause| {
            let column = quote_identifier(&clause.column);
            match clause.condition {
                Condition::IsNull => format!("{column} IS NULL"),
                condition => {
                    let placeholder = query.bind(clause.value.clone());
                    format!("{column} {} {placeholder}", condition.as_sql())
                }
            }
        })
        .collect();
    query.text.push_str(" WHERE ");
    query.text.push_str(&conditions.join(joiner));
}

/// Appends an `ORDER BY` clause.
pub fn add_sort_rules(query: &mut SqlQuery, rules: &[SortRule]) {
    if rules.is_empty() {
        return;
    }
    let rules: Vec<String> = rules
        .iter()
        .map(|rule| {
            let direction = match rule.direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            format!("{} {direction}", quote_identifier(&rule.column))
        })
        .collect();
    query.text.push_str(" ORDER BY ");
    query.text.push_str(&rules.join(", "));
}

/// Runs SQL through a [`QueryExecutor`].
#[derive(Clone)]
pub struct DatabaseNode {
    executor: Arc<dyn QueryExecutor>,
}

impl DatabaseNode {
    #[must_use]
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self { executor }
    }
}

impl std::fmt::Debug for DatabaseNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseNode").finish_non_exhaustive()
    }
}

#[async_trait]
impl NodeType for DatabaseNode {
    fn description(&self) -> NodeDescription {
        NodeDescription::new(TYPE_NAME, "Database")
            .with_input(InputPin::required("main"))
            .with_output(OutputPin::new("main"))
            .with_parameter(ParameterSpec::optional(
                "resource",
                ParameterKind::String,
                json!("database"),
            ))
            .with_parameter(ParameterSpec::optional(
                "operation",
                ParameterKind::String,
                json!("select"),
            ))
            .with_parameter(ParameterSpec::optional("schema", ParameterKind::String, json!("public")))
            .with_parameter(ParameterSpec::optional("table", ParameterKind::String, json!("")))
            .with_parameter(ParameterSpec::optional("returnColumns", ParameterKind::List, json!([])))
            .with_parameter(ParameterSpec::optional("where", ParameterKind::List, json!([])))
            .with_parameter(ParameterSpec::optional(
                "combineConditions",
                ParameterKind::Options(vec!["AND".to_string(), "OR".to_string()]),
                json!("AND"),
            ))
            .with_parameter(ParameterSpec::optional("sort", ParameterKind::List, json!([])))
            .with_parameter(ParameterSpec::optional("returnAll", ParameterKind::Boolean, json!(false)))
            .with_parameter(ParameterSpec::optional(
                "limit",
                ParameterKind::Number,
                json!(DEFAULT_LIMIT),
            ))
            .with_parameter(ParameterSpec::optional("query", ParameterKind::String, json!("")))
            .with_parameter(ParameterSpec::optional("queryValues", ParameterKind::List, json!([])))
    }

    async fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<NodeOutput, NodeError> {
        let resource = Resource::from_parameters(ctx.parameters())?;
        debug!(?resource, "dispatching database operation");
        run_per_item(
            &Dispatch {
                executor: self.executor.as_ref(),
                resource,
            },
            ctx,
        )
        .await
    }
}

struct Dispatch<'a> {
    executor: &'a dyn QueryExecutor,
    resource: Resource,
}

#[async_trait]
impl ItemOperation for Dispatch<'_> {
    async fn execute_item(
        &self,
        ctx: &ExecutionContext<'_>,
        index: usize,
        _item: &Item,
    ) -> Result<Vec<Item>, NodeError> {
        let query = match self.resource {
            Resource::Database(DatabaseOperation::Select) => select_query(ctx, index)?,
            Resource::Database(DatabaseOperation::ExecuteQuery) => execute_query(ctx, index)?,
        };
        let rows = self.executor.query(&query).await?;
        Ok(rows.into_iter().map(|row| Item::derive(row, index)).collect())
    }
}

fn select_query(ctx: &ExecutionContext<'_>, index: usize) -> Result<SqlQuery, NodeError> {
    let schema: String = ctx.item_parameter_as("schema", index)?;
    let table: String = ctx.item_parameter_as("table", index)?;
    if table.is_empty() {
        return Err(NodeError::new("a table is required").at_item(index));
    }
    let columns: Vec<String> = ctx.item_parameter_as("returnColumns", index)?;
    let clauses: Vec<WhereClause> = ctx.item_parameter_as("where", index)?;
    let combinator: Combinator = ctx.item_parameter_as("combineConditions", index)?;
    let rules: Vec<SortRule> = ctx.item_parameter_as("sort", index)?;
    let return_all: bool = ctx.item_parameter_as("returnAll", index)?;

    let projection = if columns.is_empty() {
        "*".to_string()
    } else {
        columns
            .iter()
            .map(|column| quote_identifier(column))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let mut query = SqlQuery::new(format!(
        "SELECT {projection} FROM {}.{}",
        quote_identifier(&schema),
        quote_identifier(&table)
    ));
    add_where_clauses(&mut query, &clauses, combinator);
    add_sort_rules(&mut query, &rules);
    if !return_all {
        let limit: u64 = ctx.item_parameter_as("limit", index)?;
        query.text.push_str(&format!(" LIMIT {limit}"));
    }
    Ok(query)
}

fn execute_query(ctx: &ExecutionContext<'_>, index: usize) -> Result<SqlQuery, NodeError> {
    let text: String = ctx.item_parameter_as("query", index)?;
    if text.trim().is_empty() {
        return Err(NodeError::new("the query is empty").at_item(index));
    }
    let values: Vec<JsonValue> = ctx.item_parameter_as("queryValues", index)?;
    Ok(SqlQuery { text, values })
}
