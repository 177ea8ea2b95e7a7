use sqlsrv_core::prelude::*;
use sqlsrv_core::test_utils::ScriptedConnector;
use sqlsrv_core::wire::WireValue;

fn config() -> ConnectionConfig {
    ConnectionConfig::new("localhost", "sa", "Passw0rd!")
}

#[tokio::test]
async fn named_and_positional_markers_reach_the_server_as_native() -> Result<(), SqlsrvError> {
    let (manager, script) = ScriptedConnector::manager();
    let conn = manager.connect(&config()).await?;
    script.push_done(1);

    let stmt = Statement::other("UPDATE people SET name = :name WHERE id = ? AND note <> ':skip'")
        .bind(RowValues::Text("Grace".into()))
        .bind(RowValues::Int(7));
    let result = execute(&conn, &stmt).await?;
    assert_eq!(result.rows_affected(), Some(1));

    let request = script.last_request().expect("request recorded");
    assert_eq!(
        request.sql,
        "UPDATE people SET name = @P1 WHERE id = @P2 AND note <> ':skip'"
    );
    assert_eq!(
        request.params,
        vec![WireValue::String("Grace".into()), WireValue::BigInt(7)]
    );
    assert!(!request.expects_rows);

    // The caller's statement is never rewritten.
    assert_eq!(stmt.sql(), "UPDATE people SET name = :name WHERE id = ? AND note <> ':skip'");
    assert_eq!(conn.last_query().await.as_deref(), Some(request.sql.as_str()));
    Ok(())
}

#[tokio::test]
async fn numbered_markers_may_repeat_a_slot() -> Result<(), SqlsrvError> {
    let (manager, script) = ScriptedConnector::manager();
    let conn = manager.connect(&config()).await?;
    script.push_done(0);

    let stmt = Statement::other("DELETE FROM t WHERE a = ?1 OR b = ?1 OR c = ?2")
        .with_params(vec![RowValues::Int(1), RowValues::Null]);
    execute(&conn, &stmt).await?;

    let request = script.last_request().expect("request recorded");
    assert_eq!(request.sql, "DELETE FROM t WHERE a = @P1 OR b = @P1 OR c = @P2");
    assert_eq!(request.params, vec![WireValue::BigInt(1), WireValue::Null]);
    Ok(())
}

#[tokio::test]
async fn parameter_count_mismatch_never_reaches_the_server() -> Result<(), SqlsrvError> {
    let (manager, script) = ScriptedConnector::manager();
    let conn = manager.connect(&config()).await?;

    let stmt = Statement::select("SELECT * FROM t WHERE a = ? AND b = ?").bind(RowValues::Int(1));
    let err = execute(&conn, &stmt).await.unwrap_err();
    assert!(matches!(err, SqlsrvError::ParameterError(_)), "{err:?}");

    let mixed = Statement::select("SELECT ?, ?2").with_params(vec![RowValues::Int(1), RowValues::Int(2)]);
    assert!(matches!(
        execute(&conn, &mixed).await,
        Err(SqlsrvError::ParameterError(_))
    ));

    assert!(script.requests().is_empty());
    assert!(!conn.is_busy());
    assert!(!conn.is_closed());
    Ok(())
}

#[tokio::test]
async fn json_parameters_are_sent_as_text() -> Result<(), SqlsrvError> {
    let (manager, script) = ScriptedConnector::manager();
    let conn = manager.connect(&config()).await?;
    script.push_done(1);

    let payload = serde_json::json!({"tags": ["a", "b"]});
    let stmt = Statement::other("UPDATE docs SET body = ? WHERE id = ?")
        .bind(RowValues::JSON(payload.clone()))
        .bind(RowValues::Int(3));
    execute(&conn, &stmt).await?;

    let request = script.last_request().expect("request recorded");
    assert_eq!(request.params[0], WireValue::String(payload.to_string()));
    Ok(())
}
