//! Record store engine
//!
//! [`RdbmsRecordStore`] runs every public operation through the same
//! sequence: acquire one
//! [`ScopedConnection`](crate::datasource::ScopedConnection), translate the dialect
//! template, bind parameters, execute, then commit or roll back. The
//! connection is released when the guard drops, on every exit path.
//!
//! Mutating operations run inside one transaction. Reads run as a single
//! statement on the scoped connection.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::codec::{column_selector, PostcardCodec, RecordCodec};
use crate::config::{EmptyIdLookup, StoreConfig};
use crate::connection::{Connection, Transaction};
use crate::datasource::{DataSource, DataSourceRegistry};
use crate::dialect::DialectDescriptor;
use crate::error::{Error, Result};
use crate::translator::{
    logical_table_name, normalize_pagination, normalize_time_range, physical_table_name,
    with_id_params, with_table_name, TableIdentity, UNBOUNDED,
};
use crate::types::{Record, Row, Value};

/// Distributed lock service layered on a record store's data source
#[async_trait]
pub trait LockProvider: Send + Sync {
    /// Try to take the named lock, returns whether it was acquired
    async fn try_lock(&self, name: &str) -> Result<bool>;

    /// Release the named lock
    async fn unlock(&self, name: &str) -> Result<()>;
}

/// Storage operations for analytics records.
///
/// Time bounds are epoch milliseconds, `time_from` inclusive. Pagination is
/// zero-indexed and counts rows. `-1` means unbounded for every time and
/// pagination argument.
///
/// Categories must be non-negative: the category is part of the physical
/// table name, and `ANX_-1_events` is not a valid identifier. Any operation
/// given a negative category fails with an invalid argument error before a
/// connection is opened.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create the store's bookkeeping tables if they are missing
    async fn bootstrap(&self) -> Result<()>;

    /// Create a record table
    async fn create_table(&self, category_id: i64, table_name: &str) -> Result<()>;

    /// Drop a record table
    async fn drop_table(&self, category_id: i64, table_name: &str) -> Result<()>;

    /// Whether a record table exists (case-insensitive)
    async fn table_exists(&self, category_id: i64, table_name: &str) -> Result<bool>;

    /// Logical names of all record tables in a category, uppercased
    async fn list_tables(&self, category_id: i64) -> Result<Vec<String>>;

    /// Insert records, all or nothing
    async fn put(&self, records: &[Record]) -> Result<()>;

    /// Read a page of records in a time range
    #[allow(clippy::too_many_arguments)]
    async fn get_records(
        &self,
        category_id: i64,
        table_name: &str,
        columns: Option<&[String]>,
        time_from: i64,
        time_to: i64,
        records_from: i64,
        records_count: i64,
    ) -> Result<Vec<Record>>;

    /// Read records by id
    async fn get_records_by_ids(
        &self,
        category_id: i64,
        table_name: &str,
        columns: Option<&[String]>,
        ids: &[String],
    ) -> Result<Vec<Record>>;

    /// Delete records in a time range
    async fn delete_range(
        &self,
        category_id: i64,
        table_name: &str,
        time_from: i64,
        time_to: i64,
    ) -> Result<()>;

    /// Delete records by id; an empty id list does nothing
    async fn delete_by_ids(&self, category_id: i64, table_name: &str, ids: &[String])
        -> Result<()>;

    /// Lock service for this store, if it has one
    fn lock_provider(&self) -> Option<Arc<dyn LockProvider>>;

    /// Number of records in a table
    async fn record_count(&self, category_id: i64, table_name: &str) -> Result<usize> {
        let records = self
            .get_records(category_id, table_name, None, UNBOUNDED, UNBOUNDED, UNBOUNDED, UNBOUNDED)
            .await?;
        Ok(records.len())
    }
}

/// Statements that share a target table
struct StatementGroup {
    table: Option<String>,
    statements: Vec<(String, Vec<Value>)>,
}

impl StatementGroup {
    fn new(table: Option<String>) -> Self {
        Self {
            table,
            statements: Vec::new(),
        }
    }

    fn push(&mut self, sql: String, params: Vec<Value>) {
        self.statements.push((sql, params));
    }
}

/// Relational record store driven by a [`DialectDescriptor`]
pub struct RdbmsRecordStore {
    dialect: Arc<DialectDescriptor>,
    source: Arc<dyn DataSource>,
    codec: Arc<dyn RecordCodec>,
    properties: Arc<HashMap<String, String>>,
    empty_id_lookup: EmptyIdLookup,
}

impl std::fmt::Debug for RdbmsRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RdbmsRecordStore")
            .field("dialect", &self.dialect.name())
            .field("source", &self.source.name())
            .field("empty_id_lookup", &self.empty_id_lookup)
            .finish()
    }
}

impl RdbmsRecordStore {
    /// Create a store over a data source with the default codec
    pub fn new(dialect: DialectDescriptor, source: Arc<dyn DataSource>) -> Self {
        Self {
            dialect: Arc::new(dialect),
            source,
            codec: Arc::new(PostcardCodec),
            properties: Arc::new(HashMap::new()),
            empty_id_lookup: EmptyIdLookup::default(),
        }
    }

    /// Initialize from a properties map, resolving the data source by name.
    ///
    /// Fails with a configuration error when the `datasource` property is
    /// missing or names a source the registry does not know.
    pub fn init(
        properties: HashMap<String, String>,
        registry: &DataSourceRegistry,
    ) -> Result<Self> {
        Self::from_config(StoreConfig::from_properties(properties)?, registry)
    }

    /// Initialize from a validated [`StoreConfig`]
    pub fn from_config(config: StoreConfig, registry: &DataSourceRegistry) -> Result<Self> {
        let source = registry.resolve(&config.datasource)?;
        let dialect = config.resolve_dialect(source.database_type())?;

        info!(
            datasource = %config.datasource,
            dialect = %dialect.name(),
            "Initialized record store"
        );

        Ok(Self::new(dialect, source)
            .with_empty_id_lookup(config.empty_id_lookup)
            .with_properties(config.properties))
    }

    /// Use a different value codec
    pub fn with_codec(mut self, codec: Arc<dyn RecordCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Set the empty id lookup behaviour
    pub fn with_empty_id_lookup(mut self, mode: EmptyIdLookup) -> Self {
        self.empty_id_lookup = mode;
        self
    }

    /// Set the properties exposed by [`Self::properties`]
    pub fn with_properties(mut self, properties: HashMap<String, String>) -> Self {
        self.properties = Arc::new(properties);
        self
    }

    /// Dialect this store uses
    pub fn dialect(&self) -> &DialectDescriptor {
        &self.dialect
    }

    /// Properties captured at initialization
    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    /// Run the bookkeeping probe on its own connection. A failing probe
    /// means "absent".
    pub async fn system_tables_exist(&self) -> Result<bool> {
        let conn = self.source.connection().await?;
        Ok(self.probe_system_tables(&*conn).await)
    }

    async fn probe_system_tables(&self, conn: &dyn Connection) -> bool {
        let sql = self.dialect.system_table_check_query();
        match conn.query(sql, &[]).await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "System table probe failed, treating as absent");
                false
            }
        }
    }

    /// Acquire a connection and run statement groups in one transaction on it
    async fn execute_in_transaction(
        &self,
        operation: &'static str,
        groups: &[StatementGroup],
    ) -> Result<u64> {
        let conn = self
            .source
            .connection()
            .await
            .map_err(|e| e.in_operation(operation, single_table(groups)))?;
        run_groups(&*conn, operation, groups).await
    }

    async fn query_records(
        &self,
        sql: &str,
        params: &[Value],
        category_id: i64,
        table_name: &str,
        columns: Option<&[String]>,
    ) -> Result<Vec<Record>> {
        let selector = column_selector(columns);
        let conn = self.source.connection().await?;

        debug!(sql = %sql, params = params.len(), "Querying records");
        let rows = conn.query(sql, params).await?;
        debug!(rows = rows.len(), "Query returned");

        rows.into_iter()
            .map(|row| {
                let (id, timestamp, data) = split_record_row(row)?;
                let values = match data {
                    Some(bytes) => self.codec.decode(&bytes, selector.as_ref())?,
                    None => Vec::new(),
                };
                Ok(Record::new(id, category_id, table_name, timestamp, values))
            })
            .collect()
    }

    async fn scan_tables(&self, category_id: i64) -> Result<Vec<String>> {
        let conn = self.source.connection().await?;
        let tables = conn.list_tables().await?;
        let mut names: Vec<String> = tables
            .iter()
            .filter_map(|t| logical_table_name(t, category_id))
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

fn single_table(groups: &[StatementGroup]) -> Option<String> {
    match groups {
        [group] => group.table.clone(),
        _ => None,
    }
}

/// Run statement groups in one transaction on `conn`, returns total affected
/// rows.
///
/// Errors come back wrapped in `operation`, naming the table whose
/// statement failed.
async fn run_groups(
    conn: &dyn Connection,
    operation: &'static str,
    groups: &[StatementGroup],
) -> Result<u64> {
    let tx = conn
        .begin()
        .await
        .map_err(|e| e.in_operation(operation, single_table(groups)))?;

    trace!(operation, groups = groups.len(), "Transaction started");

    match execute_groups(&*tx, groups).await {
        Ok(affected) => {
            tx.commit()
                .await
                .map_err(|e| e.in_operation(operation, single_table(groups)))?;
            trace!(operation, affected, "Transaction committed");
            Ok(affected)
        }
        Err((e, table)) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(operation, error = %rollback_err, "Rollback failed after statement error");
            }
            Err(e.in_operation(operation, table))
        }
    }
}

async fn execute_groups(
    tx: &dyn Transaction,
    groups: &[StatementGroup],
) -> std::result::Result<u64, (Error, Option<String>)> {
    let mut affected = 0u64;
    for group in groups {
        let statements: Vec<(&str, &[Value])> = group
            .statements
            .iter()
            .map(|(sql, params)| (sql.as_str(), params.as_slice()))
            .collect();
        for (sql, _) in &statements {
            debug!(sql = %sql, "Executing statement");
        }
        let counts = tx
            .execute_batch(&statements)
            .await
            .map_err(|e| (e, group.table.clone()))?;
        affected += counts.iter().sum::<u64>();
    }
    Ok(affected)
}

/// Split a `(record_id, record_timestamp, record_data)` row
fn split_record_row(row: Row) -> Result<(String, i64, Option<Vec<u8>>)> {
    if row.len() < 3 {
        return Err(Error::query(format!(
            "record row has {} columns, expected 3",
            row.len()
        )));
    }

    let mut values = row.into_values().into_iter();
    let id = match values.next() {
        Some(Value::String(id)) => id,
        other => {
            return Err(Error::query(format!(
                "record id column is not text: {:?}",
                other
            )))
        }
    };
    let timestamp = values
        .next()
        .and_then(|v| v.as_i64())
        .ok_or_else(|| Error::query("record timestamp column is not an integer"))?;
    let data = match values.next() {
        Some(Value::Bytes(bytes)) => Some(bytes),
        Some(Value::Null) | None => None,
        Some(other) => {
            return Err(Error::query(format!(
                "record data column is not binary: {:?}",
                other
            )))
        }
    };

    Ok((id, timestamp, data))
}

/// One statement per template, addressed to a single table
fn table_group(category_id: i64, table_name: &str, templates: &[String]) -> Result<StatementGroup> {
    let mut group = StatementGroup::new(Some(physical_table_name(category_id, table_name)?));
    for template in templates {
        group.push(with_table_name(template, category_id, table_name)?, Vec::new());
    }
    Ok(group)
}

fn id_params(ids: &[String]) -> Vec<Value> {
    ids.iter().map(|id| Value::String(id.clone())).collect()
}

#[async_trait]
impl RecordStore for RdbmsRecordStore {
    async fn bootstrap(&self) -> Result<()> {
        let conn = self
            .source
            .connection()
            .await
            .map_err(|e| e.in_operation("bootstrap", None))?;
        if self.probe_system_tables(&*conn).await {
            debug!(dialect = %self.dialect.name(), "System tables present");
            return Ok(());
        }

        let mut group = StatementGroup::new(None);
        for query in self.dialect.system_table_init_queries() {
            group.push(query.clone(), Vec::new());
        }
        run_groups(&*conn, "bootstrap", &[group]).await?;

        info!(dialect = %self.dialect.name(), "Created system tables");
        Ok(())
    }

    async fn create_table(&self, category_id: i64, table_name: &str) -> Result<()> {
        let group = table_group(category_id, table_name, self.dialect.record_table_init_queries())
            .map_err(|e| e.in_operation("create_table", None))?;
        let table = group.table.clone().unwrap_or_default();

        self.execute_in_transaction("create_table", &[group]).await?;
        info!(table = %table, "Created record table");
        Ok(())
    }

    async fn drop_table(&self, category_id: i64, table_name: &str) -> Result<()> {
        let group = table_group(category_id, table_name, self.dialect.record_table_delete_queries())
            .map_err(|e| e.in_operation("drop_table", None))?;
        let table = group.table.clone().unwrap_or_default();

        self.execute_in_transaction("drop_table", &[group]).await?;
        info!(table = %table, "Dropped record table");
        Ok(())
    }

    async fn table_exists(&self, category_id: i64, table_name: &str) -> Result<bool> {
        let table = physical_table_name(category_id, table_name)
            .map_err(|e| e.in_operation("table_exists", None))?;
        let wanted = table_name.to_uppercase();

        let tables = self
            .scan_tables(category_id)
            .await
            .map_err(|e| e.in_operation("table_exists", Some(table)))?;
        Ok(tables.iter().any(|t| *t == wanted))
    }

    async fn list_tables(&self, category_id: i64) -> Result<Vec<String>> {
        self.scan_tables(category_id)
            .await
            .map_err(|e| e.in_operation("list_tables", None))
    }

    async fn put(&self, records: &[Record]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut slots: HashMap<TableIdentity, usize> = HashMap::new();
        let mut groups: Vec<StatementGroup> = Vec::new();
        let mut insert_sql: Vec<String> = Vec::new();

        for record in records {
            let identity = TableIdentity::new(record.category_id(), record.table_name());
            let slot = match slots.get(&identity) {
                Some(&slot) => slot,
                None => {
                    let table = identity
                        .physical_name()
                        .map_err(|e| e.in_operation("put", None))?;
                    let sql = with_table_name(
                        self.dialect.record_insert_query(),
                        identity.category_id,
                        &identity.table_name,
                    )
                    .map_err(|e| e.in_operation("put", Some(table.clone())))?;
                    groups.push(StatementGroup::new(Some(table)));
                    insert_sql.push(sql);
                    slots.insert(identity, groups.len() - 1);
                    groups.len() - 1
                }
            };

            let data = self
                .codec
                .encode(record.values())
                .map_err(|e| e.in_operation("put", groups[slot].table.clone()))?;
            groups[slot].push(
                insert_sql[slot].clone(),
                vec![
                    Value::String(record.id().to_string()),
                    Value::Int64(record.timestamp()),
                    Value::Bytes(data),
                ],
            );
        }

        let affected = self.execute_in_transaction("put", &groups).await?;
        debug!(
            records = records.len(),
            tables = groups.len(),
            affected,
            "Inserted records"
        );
        Ok(())
    }

    async fn get_records(
        &self,
        category_id: i64,
        table_name: &str,
        columns: Option<&[String]>,
        time_from: i64,
        time_to: i64,
        records_from: i64,
        records_count: i64,
    ) -> Result<Vec<Record>> {
        let table = physical_table_name(category_id, table_name)
            .map_err(|e| e.in_operation("get_records", None))?;

        let (time_from, time_to) = normalize_time_range(time_from, time_to);
        let (first, second) =
            normalize_pagination(self.dialect.pagination(), records_from, records_count);

        let result: Result<Vec<Record>> = async {
            let sql = with_table_name(self.dialect.record_retrieval_query(), category_id, table_name)?;
            let params = [
                Value::Int64(time_from),
                Value::Int64(time_to),
                Value::Int64(first),
                Value::Int64(second),
            ];
            self.query_records(&sql, &params, category_id, table_name, columns)
                .await
        }
        .await;

        result.map_err(|e| e.in_operation("get_records", Some(table)))
    }

    async fn get_records_by_ids(
        &self,
        category_id: i64,
        table_name: &str,
        columns: Option<&[String]>,
        ids: &[String],
    ) -> Result<Vec<Record>> {
        let table = physical_table_name(category_id, table_name)
            .map_err(|e| e.in_operation("get_records_by_ids", None))?;

        if ids.is_empty() {
            return match self.empty_id_lookup {
                EmptyIdLookup::Empty => {
                    debug!(table = %table, "Empty id list, nothing to read");
                    Ok(Vec::new())
                }
                EmptyIdLookup::Reject => Err(Error::invalid_argument("id list cannot be empty")
                    .in_operation("get_records_by_ids", Some(table))),
            };
        }

        let result: Result<Vec<Record>> = async {
            let sql = with_table_name(
                self.dialect.record_retrieval_with_ids_query(),
                category_id,
                table_name,
            )?;
            let sql = with_id_params(&sql, ids.len())?;
            self.query_records(&sql, &id_params(ids), category_id, table_name, columns)
                .await
        }
        .await;

        result.map_err(|e| e.in_operation("get_records_by_ids", Some(table)))
    }

    async fn delete_range(
        &self,
        category_id: i64,
        table_name: &str,
        time_from: i64,
        time_to: i64,
    ) -> Result<()> {
        let (time_from, time_to) = normalize_time_range(time_from, time_to);

        let mut group = StatementGroup::new(Some(
            physical_table_name(category_id, table_name)
                .map_err(|e| e.in_operation("delete_range", None))?,
        ));
        let sql = with_table_name(self.dialect.record_deletion_query(), category_id, table_name)
            .map_err(|e| e.in_operation("delete_range", group.table.clone()))?;
        group.push(sql, vec![Value::Int64(time_from), Value::Int64(time_to)]);

        let affected = self.execute_in_transaction("delete_range", &[group]).await?;
        debug!(affected, "Deleted records by time range");
        Ok(())
    }

    async fn delete_by_ids(
        &self,
        category_id: i64,
        table_name: &str,
        ids: &[String],
    ) -> Result<()> {
        let table = physical_table_name(category_id, table_name)
            .map_err(|e| e.in_operation("delete_by_ids", None))?;

        if ids.is_empty() {
            debug!(table = %table, "Empty id list, nothing to delete");
            return Ok(());
        }

        let sql = with_table_name(
            self.dialect.record_deletion_with_ids_query(),
            category_id,
            table_name,
        )
        .and_then(|sql| with_id_params(&sql, ids.len()))
        .map_err(|e| e.in_operation("delete_by_ids", Some(table.clone())))?;

        let mut group = StatementGroup::new(Some(table));
        group.push(sql, id_params(ids));

        let affected = self.execute_in_transaction("delete_by_ids", &[group]).await?;
        debug!(affected, ids = ids.len(), "Deleted records by id");
        Ok(())
    }

    fn lock_provider(&self) -> Option<Arc<dyn LockProvider>> {
        None
    }
}
