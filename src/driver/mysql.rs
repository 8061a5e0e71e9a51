//! `mysql_async` MySQL/MariaDB driver.
//!
//! Statements go through the text protocol, so every non-NULL cell arrives as the
//! server's textual rendering (raw bytes for binary strings). Column metadata comes
//! from the result-set header, which carries the declared character set and is
//! present even when no rows follow. Decoding into typed values is left to the
//! materializer.
//!
//! The only session statement sent on connect is `SET NAMES`; `sql_mode` and
//! `time_zone` stay whatever the server configures.

use async_trait::async_trait;
use mysql_async::consts::{ColumnFlags, ColumnType};
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Opts, OptsBuilder, QueryResult, TextProtocol, Value};

use super::{
    BINARY_CHARSET_NR, ColumnKind, Connector, DriverError, DriverHandle, ExecOutcome, RawColumn,
    RawRow, RowSource,
};
use crate::config::ConnectionConfig;
use crate::types::Charset;

/// Opens sessions with `mysql_async::Conn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlConnector;

#[async_trait]
impl Connector for MysqlConnector {
    async fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn DriverHandle>, DriverError> {
        let conn = Conn::new(connect_opts(config)).await.map_err(map_error)?;
        Ok(Box::new(MysqlHandle { conn }))
    }
}

fn connect_opts(config: &ConnectionConfig) -> Opts {
    OptsBuilder::default()
        .ip_or_hostname(config.host())
        .tcp_port(config.port())
        .user(Some(config.username()))
        .pass(Some(config.password()))
        .db_name(Some(config.database()))
        .init(vec![format!(
            "SET NAMES {}",
            server_charset_name(config.charset())
        )])
        .into()
}

/// Charset name for `SET NAMES`. `utf8` is the spelling every server version accepts
/// for the 3-byte set.
fn server_charset_name(charset: Charset) -> &'static str {
    match charset {
        Charset::Utf8mb3 => "utf8",
        other => other.as_str(),
    }
}

struct MysqlHandle {
    conn: Conn,
}

#[async_trait]
impl DriverHandle for MysqlHandle {
    async fn query<'a>(
        &'a mut self,
        sql: &'a str,
    ) -> Result<Box<dyn RowSource + 'a>, DriverError> {
        let result = self.conn.query_iter(sql).await.map_err(map_error)?;
        Ok(Box::new(MysqlRows { result }))
    }

    async fn execute(&mut self, sql: &str) -> Result<ExecOutcome, DriverError> {
        self.conn.query_drop(sql).await.map_err(map_error)?;
        Ok(ExecOutcome {
            affected_rows: self.conn.affected_rows(),
            last_insert_id: self.conn.last_insert_id().filter(|id| *id != 0),
        })
    }

    async fn ping(&mut self) -> Result<(), DriverError> {
        self.conn.ping().await.map_err(map_error)
    }

    async fn close(self: Box<Self>) -> Result<(), DriverError> {
        let handle = *self;
        handle.conn.disconnect().await.map_err(map_error)
    }
}

struct MysqlRows<'a> {
    result: QueryResult<'a, 'static, TextProtocol>,
}

#[async_trait]
impl RowSource for MysqlRows<'_> {
    async fn columns(&mut self) -> Result<Vec<RawColumn>, DriverError> {
        Ok(self
            .result
            .columns_ref()
            .iter()
            .map(|col| {
                describe_column(
                    col.name_str().into_owned(),
                    col.column_type(),
                    col.flags(),
                    col.character_set(),
                )
            })
            .collect())
    }

    async fn next_row(&mut self) -> Result<Option<RawRow>, DriverError> {
        let Some(row) = self.result.next().await.map_err(map_error)? else {
            return Ok(None);
        };
        (0..row.len())
            .map(|idx| raw_cell(row.as_ref(idx)))
            .collect::<Result<RawRow, _>>()
            .map(Some)
    }
}

fn describe_column(
    name: String,
    column_type: ColumnType,
    flags: ColumnFlags,
    charset_nr: u16,
) -> RawColumn {
    RawColumn {
        name,
        kind: column_kind(column_type, flags, charset_nr),
        unsigned: flags.contains(ColumnFlags::UNSIGNED_FLAG),
        charset_nr,
    }
}

/// The server reports ENUM/SET as strings with a flag, and TEXT/BLOB as the same
/// wire type told apart by charset.
fn column_kind(column_type: ColumnType, flags: ColumnFlags, charset_nr: u16) -> ColumnKind {
    if flags.contains(ColumnFlags::ENUM_FLAG) {
        return ColumnKind::Enum;
    }
    if flags.contains(ColumnFlags::SET_FLAG) {
        return ColumnKind::Set;
    }
    match column_type {
        ColumnType::MYSQL_TYPE_NULL => ColumnKind::Null,
        ColumnType::MYSQL_TYPE_TINY => ColumnKind::TinyInt,
        ColumnType::MYSQL_TYPE_SHORT => ColumnKind::SmallInt,
        ColumnType::MYSQL_TYPE_INT24 => ColumnKind::MediumInt,
        ColumnType::MYSQL_TYPE_LONG => ColumnKind::Int,
        ColumnType::MYSQL_TYPE_LONGLONG => ColumnKind::BigInt,
        ColumnType::MYSQL_TYPE_YEAR => ColumnKind::Year,
        ColumnType::MYSQL_TYPE_BIT => ColumnKind::Bit,
        ColumnType::MYSQL_TYPE_FLOAT => ColumnKind::Float,
        ColumnType::MYSQL_TYPE_DOUBLE => ColumnKind::Double,
        ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => ColumnKind::Decimal,
        ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE => ColumnKind::Date,
        ColumnType::MYSQL_TYPE_TIME | ColumnType::MYSQL_TYPE_TIME2 => ColumnKind::Time,
        ColumnType::MYSQL_TYPE_DATETIME | ColumnType::MYSQL_TYPE_DATETIME2 => {
            ColumnKind::DateTime
        }
        ColumnType::MYSQL_TYPE_TIMESTAMP | ColumnType::MYSQL_TYPE_TIMESTAMP2 => {
            ColumnKind::Timestamp
        }
        ColumnType::MYSQL_TYPE_STRING => ColumnKind::Char,
        ColumnType::MYSQL_TYPE_VARCHAR | ColumnType::MYSQL_TYPE_VAR_STRING => ColumnKind::VarChar,
        ColumnType::MYSQL_TYPE_TINY_BLOB
        | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
        | ColumnType::MYSQL_TYPE_LONG_BLOB
        | ColumnType::MYSQL_TYPE_BLOB => {
            if charset_nr == BINARY_CHARSET_NR {
                ColumnKind::Blob
            } else {
                ColumnKind::Text
            }
        }
        ColumnType::MYSQL_TYPE_JSON => ColumnKind::Json,
        ColumnType::MYSQL_TYPE_ENUM => ColumnKind::Enum,
        ColumnType::MYSQL_TYPE_SET => ColumnKind::Set,
        ColumnType::MYSQL_TYPE_GEOMETRY => ColumnKind::Geometry,
        _ => ColumnKind::Text,
    }
}

/// Text-protocol rows only ever carry bytes or NULL.
fn raw_cell(value: Option<&Value>) -> Result<Option<Vec<u8>>, DriverError> {
    match value {
        Some(Value::NULL) => Ok(None),
        Some(Value::Bytes(bytes)) => Ok(Some(bytes.clone())),
        Some(other) => Err(DriverError::Other(format!(
            "unexpected binary-protocol value {other:?} in a text result"
        ))),
        None => Err(DriverError::Other("row value already taken".into())),
    }
}

fn map_error(err: mysql_async::Error) -> DriverError {
    match err {
        mysql_async::Error::Server(server) => DriverError::Server {
            code: Some(server.code),
            sqlstate: Some(server.state),
            message: server.message,
        },
        mysql_async::Error::Io(io) => DriverError::ConnectionLost(io.to_string()),
        mysql_async::Error::Driver(mysql_async::DriverError::ConnectionClosed) => {
            DriverError::ConnectionLost("connection to the server is closed".into())
        }
        other => DriverError::Other(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charset_names_match_what_servers_accept() {
        assert_eq!(server_charset_name(Charset::Utf8mb3), "utf8");
        assert_eq!(server_charset_name(Charset::Utf8mb4), "utf8mb4");
        assert_eq!(server_charset_name(Charset::Latin1), "latin1");
        assert_eq!(server_charset_name(Charset::Gb18030), "gb18030");
    }

    #[test]
    fn connect_only_sets_the_charset() {
        let config = ConnectionConfig::builder("db.test", "app", "shop")
            .password("secret")
            .port(3307)
            .charset(Charset::Utf8mb3)
            .build()
            .unwrap();
        let opts = connect_opts(&config);

        assert_eq!(opts.ip_or_hostname(), "db.test");
        assert_eq!(opts.tcp_port(), 3307);
        assert_eq!(opts.user(), Some("app"));
        assert_eq!(opts.pass(), Some("secret"));
        assert_eq!(opts.db_name(), Some("shop"));
        assert_eq!(opts.init().to_vec(), vec!["SET NAMES utf8".to_string()]);
        assert!(opts.setup().is_empty());
    }

    #[test]
    fn binary_collation_text_stays_text() {
        // VARCHAR ... COLLATE utf8mb4_bin: the server sets BINARY_FLAG but the
        // charset is still 46.
        let col = describe_column(
            "code".into(),
            ColumnType::MYSQL_TYPE_VAR_STRING,
            ColumnFlags::BINARY_FLAG,
            46,
        );
        assert_eq!(col.kind, ColumnKind::VarChar);
        assert!(!col.is_binary());

        let col = describe_column(
            "digest".into(),
            ColumnType::MYSQL_TYPE_VAR_STRING,
            ColumnFlags::BINARY_FLAG,
            BINARY_CHARSET_NR,
        );
        assert!(col.is_binary());
    }

    #[test]
    fn maps_wire_types_and_flags() {
        let col = describe_column(
            "n".into(),
            ColumnType::MYSQL_TYPE_LONGLONG,
            ColumnFlags::UNSIGNED_FLAG | ColumnFlags::NOT_NULL_FLAG,
            BINARY_CHARSET_NR,
        );
        assert_eq!(col.kind, ColumnKind::BigInt);
        assert!(col.unsigned);

        let blob = ColumnType::MYSQL_TYPE_BLOB;
        assert_eq!(column_kind(blob, ColumnFlags::empty(), 45), ColumnKind::Text);
        assert_eq!(
            column_kind(blob, ColumnFlags::BINARY_FLAG, BINARY_CHARSET_NR),
            ColumnKind::Blob
        );
        assert_eq!(
            column_kind(ColumnType::MYSQL_TYPE_STRING, ColumnFlags::ENUM_FLAG, 45),
            ColumnKind::Enum
        );
        assert_eq!(
            column_kind(ColumnType::MYSQL_TYPE_NEWDECIMAL, ColumnFlags::empty(), 63),
            ColumnKind::Decimal
        );
        assert_eq!(
            column_kind(ColumnType::MYSQL_TYPE_JSON, ColumnFlags::empty(), 63),
            ColumnKind::Json
        );
    }

    #[test]
    fn text_cells_keep_their_bytes() {
        assert_eq!(raw_cell(Some(&Value::NULL)).unwrap(), None);
        assert_eq!(
            raw_cell(Some(&Value::Bytes(vec![0x00, 0xFF]))).unwrap(),
            Some(vec![0x00, 0xFF])
        );
        assert!(matches!(
            raw_cell(Some(&Value::Int(5))),
            Err(DriverError::Other(_))
        ));
    }

    #[test]
    fn server_errors_keep_code_and_sqlstate() {
        let err = map_error(mysql_async::Error::Server(mysql_async::ServerError {
            code: 1146,
            message: "Table 'shop.nope' doesn't exist".into(),
            state: "42S02".into(),
        }));
        assert_eq!(
            err,
            DriverError::Server {
                code: Some(1146),
                sqlstate: Some("42S02".into()),
                message: "Table 'shop.nope' doesn't exist".into(),
            }
        );
    }

    #[test]
    fn transport_failures_mean_the_connection_is_lost() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken pipe");
        assert!(map_error(mysql_async::Error::from(io)).is_connection_lost());
        assert!(
            map_error(mysql_async::Error::Driver(
                mysql_async::DriverError::ConnectionClosed
            ))
            .is_connection_lost()
        );
        assert!(matches!(
            map_error(mysql_async::Error::Other("bad url".into())),
            DriverError::Other(_)
        ));
    }
}
