//! Declared table shapes.
//!
//! The column specs here are the source of truth for both table creation and
//! the additive migration in [`crate::migration`].

use sea_query::{
    Alias, ColumnDef, Iden, Index, IndexCreateStatement, Table, TableAlterStatement,
    TableCreateStatement,
};

/// Reserved id of the row that represents the service itself.
pub const SENTINEL_ID: &str = "bot";

/// Language assigned to tenants and tasks when none is given.
pub const DEFAULT_LANG: &str = "en";

/// Name of the composite unique index on task identity.
pub const TASK_IDENTITY_INDEX: &str = "ux_index_1";

/// Non-unique index from older deployments, dropped at startup.
pub const LEGACY_TASK_INDEX: &str = "tasks_origin_dest";

/// Servers (tenants) table.
#[derive(Iden, Clone, Copy)]
pub enum Servers {
    #[iden = "servers"]
    Table,
    #[iden = "id"]
    Id,
    #[iden = "lang"]
    Lang,
    #[iden = "count"]
    Count,
    #[iden = "active"]
    Active,
    #[iden = "embedstyle"]
    EmbedStyle,
    #[iden = "bot2botstyle"]
    Bot2BotStyle,
    #[iden = "webhookid"]
    WebhookId,
    #[iden = "webhooktoken"]
    WebhookToken,
    #[iden = "webhookactive"]
    WebhookActive,
}

/// Tasks (relay edges) table.
#[derive(Iden, Clone, Copy)]
pub enum Tasks {
    #[iden = "tasks"]
    Table,
    #[iden = "origin"]
    Origin,
    #[iden = "dest"]
    Dest,
    #[iden = "reply"]
    Reply,
    #[iden = "server"]
    Server,
    #[iden = "active"]
    Active,
    #[iden = "LangTo"]
    LangTo,
    #[iden = "LangFrom"]
    LangFrom,
}

/// Storage type of a declared column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Bounded string.
    Text(u32),
    /// 64-bit integer.
    BigInt,
    Boolean,
}

/// Default value of a declared column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnDefault {
    Text(&'static str),
    Int(i64),
    Bool(bool),
}

/// Declaration of a single column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub default: Option<ColumnDefault>,
    pub nullable: bool,
    pub unique: bool,
    pub primary_key: bool,
}

impl ColumnSpec {
    const fn required(name: &'static str, column_type: ColumnType, default: ColumnDefault) -> Self {
        Self {
            name,
            column_type,
            default: Some(default),
            nullable: false,
            unique: false,
            primary_key: false,
        }
    }

    const fn optional(name: &'static str, column_type: ColumnType) -> Self {
        Self {
            name,
            column_type,
            default: None,
            nullable: true,
            unique: false,
            primary_key: false,
        }
    }

    const fn key(name: &'static str, column_type: ColumnType) -> Self {
        Self {
            name,
            column_type,
            default: None,
            nullable: false,
            unique: false,
            primary_key: false,
        }
    }

    /// Build the sea-query column definition for this spec.
    pub fn to_column_def(&self) -> ColumnDef {
        let mut def = ColumnDef::new(Alias::new(self.name));
        match self.column_type {
            ColumnType::Text(len) => def.string_len(len),
            ColumnType::BigInt => def.big_integer(),
            ColumnType::Boolean => def.boolean(),
        };
        if self.nullable {
            def.null();
        } else {
            def.not_null();
        }
        match self.default {
            Some(ColumnDefault::Text(value)) => def.default(value),
            Some(ColumnDefault::Int(value)) => def.default(value),
            Some(ColumnDefault::Bool(value)) => def.default(value),
            None => &mut def,
        };
        if self.primary_key {
            def.primary_key();
        } else if self.unique {
            def.unique_key();
        }
        def
    }
}

const SERVER_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec {
        name: "id",
        column_type: ColumnType::Text(32),
        default: None,
        nullable: false,
        unique: true,
        primary_key: true,
    },
    ColumnSpec::required("lang", ColumnType::Text(8), ColumnDefault::Text(DEFAULT_LANG)),
    ColumnSpec::required("count", ColumnType::BigInt, ColumnDefault::Int(0)),
    ColumnSpec::required("active", ColumnType::Boolean, ColumnDefault::Bool(true)),
    ColumnSpec::required("embedstyle", ColumnType::Text(8), ColumnDefault::Text("on")),
    ColumnSpec::required("bot2botstyle", ColumnType::Text(8), ColumnDefault::Text("off")),
    ColumnSpec::optional("webhookid", ColumnType::Text(32)),
    ColumnSpec::optional("webhooktoken", ColumnType::Text(255)),
    ColumnSpec::required("webhookactive", ColumnType::Boolean, ColumnDefault::Bool(false)),
];

const TASK_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::key("origin", ColumnType::Text(32)),
    ColumnSpec::key("dest", ColumnType::Text(32)),
    ColumnSpec::key("reply", ColumnType::Text(32)),
    ColumnSpec::key("server", ColumnType::Text(32)),
    ColumnSpec::required("active", ColumnType::Boolean, ColumnDefault::Bool(true)),
    ColumnSpec::required("LangTo", ColumnType::Text(8), ColumnDefault::Text(DEFAULT_LANG)),
    ColumnSpec::required("LangFrom", ColumnType::Text(8), ColumnDefault::Text(DEFAULT_LANG)),
];

/// Columns that identify a task; re-adding the same tuple updates in place.
pub const TASK_IDENTITY: [Tasks; 4] = [Tasks::Origin, Tasks::Dest, Tasks::LangTo, Tasks::LangFrom];

/// Declared shape of the servers table.
pub fn declared_server_columns() -> &'static [ColumnSpec] {
    SERVER_COLUMNS
}

/// Declared shape of the tasks table.
pub fn declared_task_columns() -> &'static [ColumnSpec] {
    TASK_COLUMNS
}

fn create_table(table: impl Iden + 'static, columns: &[ColumnSpec]) -> TableCreateStatement {
    let mut stmt = Table::create();
    stmt.table(table).if_not_exists();
    for spec in columns {
        stmt.col(&mut spec.to_column_def());
    }
    stmt.to_owned()
}

/// `CREATE TABLE IF NOT EXISTS servers (...)`.
pub fn create_servers_table() -> TableCreateStatement {
    create_table(Servers::Table, SERVER_COLUMNS)
}

/// `CREATE TABLE IF NOT EXISTS tasks (...)`.
pub fn create_tasks_table() -> TableCreateStatement {
    create_table(Tasks::Table, TASK_COLUMNS)
}

/// Composite unique index backing task upserts.
pub fn create_task_identity_index() -> IndexCreateStatement {
    let mut stmt = Index::create();
    stmt.if_not_exists()
        .unique()
        .name(TASK_IDENTITY_INDEX)
        .table(Tasks::Table);
    for column in TASK_IDENTITY {
        stmt.col(column);
    }
    stmt.to_owned()
}

/// `ALTER TABLE servers ADD COLUMN ...` for one declared column.
pub fn add_server_column(spec: &ColumnSpec) -> TableAlterStatement {
    Table::alter()
        .table(Servers::Table)
        .add_column(&mut spec.to_column_def())
        .to_owned()
}
