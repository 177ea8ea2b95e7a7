use std::time::Duration;

use sqlsrv_core::prelude::*;
use sqlsrv_core::test_utils::{ScriptedConnector, server_error};
use sqlsrv_core::wire::{TransportError, WireColumn, WireValue};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn config() -> ConnectionConfig {
    ConnectionConfig::builder(r"tcp:db.local\SQLEXPRESS,1444", "app", "s3cret")
        .database("inventory")
        .finish()
}

fn id_rows(n: i32) -> (Vec<WireColumn>, Vec<Vec<WireValue>>) {
    (
        vec![WireColumn::new("id", "int")],
        (1..=n).map(|i| vec![WireValue::Int(i)]).collect(),
    )
}

#[tokio::test]
async fn login_record_is_built_from_the_configuration() -> Result<(), SqlsrvError> {
    let (manager, script) = ScriptedConnector::manager();
    let conn = manager.connect(&config()).await?;

    let logins = script.logins();
    assert_eq!(logins.len(), 1);
    let login = &logins[0];
    assert_eq!(login.host, "db.local");
    assert_eq!(login.instance_name.as_deref(), Some("SQLEXPRESS"));
    assert_eq!(login.port, Some(1444));
    assert_eq!(login.database.as_deref(), Some("inventory"));
    assert_eq!(login.user, "app");
    assert_eq!(login.password.expose(), "s3cret");

    // Neither the echo nor the debug output carries the credentials.
    let echoed = serde_json::to_string(conn.info()).expect("info serializes");
    assert!(!echoed.contains("s3cret"));
    assert!(!format!("{conn:?}").contains("s3cret"));
    assert_eq!(conn.identity().as_str().len(), 40);
    Ok(())
}

#[tokio::test]
async fn rejected_login_is_an_auth_error() {
    let (manager, script) = ScriptedConnector::manager();
    script.fail_login(server_error(18456, "Login failed for user 'app'."));

    let err = manager.connect(&config()).await.unwrap_err();
    let SqlsrvError::AuthError(driver) = &err else {
        panic!("expected an auth error, got {err:?}");
    };
    assert_eq!(driver.sql_state, "28000");
    assert_eq!(driver.code, Some(18456));
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    let (manager, script) = ScriptedConnector::manager();
    script.fail_login(TransportError::Io("connection refused".into()));

    let err = manager.connect(&config()).await.unwrap_err();
    let SqlsrvError::NetworkError(driver) = &err else {
        panic!("expected a network error, got {err:?}");
    };
    assert_eq!(driver.sql_state, "08S01");
}

#[tokio::test]
async fn missing_user_fails_before_dialing() {
    let (manager, script) = ScriptedConnector::manager();
    let err = manager
        .connect(&ConnectionConfig::new("localhost", "", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, SqlsrvError::ConfigError(_)), "{err:?}");
    assert!(script.logins().is_empty());
}

#[tokio::test]
async fn disconnect_is_idempotent() -> Result<(), SqlsrvError> {
    let (manager, script) = ScriptedConnector::manager();
    let conn = manager.connect(&config()).await?;

    assert!(conn.disconnect().await);
    assert!(disconnect(&conn).await);
    assert_eq!(script.close_count(), 1);
    assert!(conn.is_closed());

    let err = execute(&conn, &Statement::select("SELECT 1")).await.unwrap_err();
    assert!(matches!(err, SqlsrvError::ConnectionClosed), "{err:?}");
    assert!(matches!(
        conn.introspect_tables(None).await,
        Err(SqlsrvError::ConnectionClosed)
    ));
    assert!(script.requests().is_empty());
    Ok(())
}

#[tokio::test]
async fn failed_close_still_releases_the_handle() -> Result<(), SqlsrvError> {
    let (manager, script) = ScriptedConnector::manager();
    let conn = manager.connect(&config()).await?;
    script.fail_close(TransportError::Io("reset by peer".into()));

    assert!(!conn.disconnect().await);
    assert!(conn.is_closed());
    assert!(conn.disconnect().await);
    Ok(())
}

#[tokio::test]
async fn open_stream_makes_the_connection_busy() -> Result<(), SqlsrvError> {
    let (manager, script) = ScriptedConnector::manager();
    let conn = manager.connect(&config()).await?;
    let (columns, rows) = id_rows(3);
    script.push_rows(columns, rows);
    script.push_done(1);

    let mut stream = execute(&conn, &Statement::select("SELECT id FROM t")).await?.into_rows()?;
    assert!(conn.is_busy());
    let first = stream.next().await?.expect("first row");
    assert_eq!(first.try_get::<i64>("id")?, 1);

    let err = execute(&conn, &Statement::other("DELETE FROM t")).await.unwrap_err();
    assert!(matches!(err, SqlsrvError::ConnectionBusyError), "{err:?}");
    assert_eq!(script.requests().len(), 1);
    assert_eq!(script.pending_replies(), 1);

    stream.close().await?;
    assert!(!conn.is_busy());
    let deleted = execute(&conn, &Statement::other("DELETE FROM t")).await?;
    assert_eq!(deleted.rows_affected(), Some(1));
    Ok(())
}

#[tokio::test]
async fn dropped_stream_is_drained_before_the_next_statement() -> Result<(), SqlsrvError> {
    init_tracing();
    let (manager, script) = ScriptedConnector::manager();
    let conn = manager.connect(&config()).await?;
    let (columns, rows) = id_rows(5);
    script.push_rows(columns, rows);
    script.push_done(2);

    {
        let mut stream = execute(&conn, &Statement::select("SELECT id FROM t")).await?.into_rows()?;
        stream.next().await?;
        assert_eq!(script.rows_fetched(), 1);
    }
    assert!(!conn.is_busy());
    assert!(!conn.is_closed());

    let updated = execute(&conn, &Statement::other("UPDATE t SET x = 1")).await?;
    assert_eq!(updated.rows_affected(), Some(2));
    assert_eq!(script.rows_fetched(), 5);
    Ok(())
}

#[tokio::test]
async fn command_timeout_closes_the_connection() -> Result<(), SqlsrvError> {
    init_tracing();
    let (manager, script) = ScriptedConnector::manager();
    let config = ConnectionConfig::builder("localhost", "sa", "pw")
        .command_timeout(Some(Duration::from_millis(50)))
        .finish();
    let conn = manager.connect(&config).await?;
    script.push_done(0);
    script.delay_sends(Duration::from_secs(2));

    let err = execute(&conn, &Statement::other("WAITFOR DELAY '00:01'")).await.unwrap_err();
    let SqlsrvError::NetworkError(driver) = &err else {
        panic!("expected a network error, got {err:?}");
    };
    assert_eq!(driver.sql_state, "HYT00");
    assert!(conn.is_closed());
    assert!(matches!(
        execute(&conn, &Statement::select("SELECT 1")).await,
        Err(SqlsrvError::ConnectionClosed)
    ));
    Ok(())
}

#[tokio::test]
async fn cancelled_statement_closes_the_connection() -> Result<(), SqlsrvError> {
    init_tracing();
    let (manager, script) = ScriptedConnector::manager();
    let conn = manager.connect(&ConnectionConfig::new("localhost", "sa", "pw")).await?;
    script.push_done(0);
    script.delay_sends(Duration::from_secs(2));

    let stmt = Statement::other("UPDATE t SET x = 1");
    let outcome = tokio::time::timeout(Duration::from_millis(50), execute(&conn, &stmt)).await;
    assert!(outcome.is_err());
    assert!(conn.is_closed());
    assert!(!conn.is_busy());
    Ok(())
}

#[tokio::test]
async fn server_errors_leave_the_connection_usable() -> Result<(), SqlsrvError> {
    let (manager, script) = ScriptedConnector::manager();
    let conn = manager.connect(&config()).await?;
    script.push_server_error(208, "Invalid object name 'missing'.");
    script.push_done(0);

    let err = execute(&conn, &Statement::select("SELECT * FROM missing")).await.unwrap_err();
    let SqlsrvError::QueryError(driver) = &err else {
        panic!("expected a query error, got {err:?}");
    };
    assert_eq!(driver.sql_state, "42S02");
    assert_eq!(driver.statement.as_deref(), Some("SELECT * FROM missing"));

    assert!(!conn.is_closed());
    execute(&conn, &Statement::other("SET NOCOUNT ON")).await?;
    Ok(())
}

#[tokio::test]
async fn transport_failure_mid_stream_is_fatal() -> Result<(), SqlsrvError> {
    init_tracing();
    let (manager, script) = ScriptedConnector::manager();
    let conn = manager.connect(&config()).await?;
    let (columns, rows) = id_rows(2);
    script.push(sqlsrv_core::test_utils::Reply::RowsThenFail {
        columns,
        rows,
        error: TransportError::Io("connection reset".into()),
    });

    let mut stream = execute(&conn, &Statement::select("SELECT id FROM t")).await?.into_rows()?;
    assert!(stream.next().await?.is_some());
    assert!(stream.next().await?.is_some());
    let err = stream.next().await.unwrap_err();
    assert!(matches!(err, SqlsrvError::NetworkError(_)), "{err:?}");
    assert!(stream.is_finished());
    drop(stream);

    assert!(conn.is_closed());
    assert!(!conn.is_busy());
    Ok(())
}

#[tokio::test]
async fn character_set_cannot_change_after_connect() -> Result<(), SqlsrvError> {
    let (manager, _script) = ScriptedConnector::manager();
    let conn = manager.connect(&config()).await?;
    assert!(matches!(
        conn.set_charset("binary"),
        Err(SqlsrvError::UnsupportedOperationError(_))
    ));
    assert_eq!(conn.character_set(), CharacterSet::Utf8);
    Ok(())
}

#[tokio::test]
async fn error_left_by_a_dropped_stream_does_not_fail_the_next_statement() -> Result<(), SqlsrvError> {
    init_tracing();
    let (manager, script) = ScriptedConnector::manager();
    let conn = manager.connect(&config()).await?;
    let (columns, rows) = id_rows(3);
    script.push(sqlsrv_core::test_utils::Reply::RowsThenFail {
        columns,
        rows,
        error: server_error(8134, "Divide by zero error encountered."),
    });
    script.push_done(7);

    {
        let mut stream = execute(&conn, &Statement::select("SELECT id / 0 FROM t")).await?.into_rows()?;
        assert!(stream.next().await?.is_some());
    }

    let updated = execute(&conn, &Statement::other("UPDATE u SET y = 1")).await?;
    assert_eq!(updated.rows_affected(), Some(7));
    assert_eq!(script.requests().len(), 2);
    assert_eq!(
        script.last_request().map(|r| r.sql),
        Some("UPDATE u SET y = 1".to_string())
    );
    assert!(!conn.is_closed());
    Ok(())
}

#[tokio::test]
async fn transport_failure_while_discarding_closes_the_connection() -> Result<(), SqlsrvError> {
    let (manager, script) = ScriptedConnector::manager();
    let conn = manager.connect(&config()).await?;
    let (columns, rows) = id_rows(3);
    script.push(sqlsrv_core::test_utils::Reply::RowsThenFail {
        columns,
        rows,
        error: TransportError::Io("connection reset".into()),
    });

    {
        let mut stream = execute(&conn, &Statement::select("SELECT id FROM t")).await?.into_rows()?;
        stream.next().await?;
    }

    let err = execute(&conn, &Statement::other("UPDATE u SET y = 1")).await.unwrap_err();
    let SqlsrvError::NetworkError(driver) = &err else {
        panic!("expected a network error, got {err:?}");
    };
    assert_eq!(driver.statement.as_deref(), Some("SELECT id FROM t"));
    assert!(conn.is_closed());
    assert_eq!(script.requests().len(), 1);
    Ok(())
}
