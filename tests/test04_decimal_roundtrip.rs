use chrono::NaiveDate;
use serde::Deserialize;
use sqlsrv_core::prelude::*;
use sqlsrv_core::test_utils::ScriptedConnector;
use sqlsrv_core::wire::{WireColumn, WireValue};

fn decimal_column(name: &str, precision: u8, scale: u8) -> WireColumn {
    let mut column = WireColumn::new(name, "decimal");
    column.precision = Some(precision);
    column.scale = Some(scale);
    column
}

#[tokio::test]
async fn decimals_survive_the_round_trip_exactly() -> Result<(), SqlsrvError> {
    let (manager, script) = ScriptedConnector::manager();
    let conn = manager.connect(&ConnectionConfig::new("localhost", "sa", "pw")).await?;

    let amount: Numeric = "12345678901234567890.1234".parse()?;
    script.push_done(1);
    execute(
        &conn,
        &Statement::other("UPDATE ledger SET amount = ? WHERE id = 1").bind(RowValues::Decimal(amount)),
    )
    .await?;
    assert_eq!(
        script.last_request().map(|r| r.params),
        Some(vec![WireValue::Numeric(amount)])
    );

    script.push_rows(
        vec![decimal_column("amount", 38, 4), decimal_column("price", 10, 2)],
        vec![vec![
            WireValue::Numeric(amount),
            WireValue::Numeric(Numeric::new(1999, 2)),
        ]],
    );
    let mut rows = execute(&conn, &Statement::select("SELECT amount, price FROM ledger")).await?.into_rows()?;
    let row = rows.next().await?.expect("one row");

    let read: Numeric = row.try_get("amount")?;
    assert_eq!(read.to_string(), "12345678901234567890.1234");
    assert_eq!(read.precision(), 38);
    assert_eq!(read.scale(), 4);

    let price: Numeric = row.try_get("price")?;
    assert_eq!(price.to_string(), "19.99");
    assert!(matches!(row.get("price"), Some(RowValues::Decimal(_))));
    assert!(row.try_get::<f64>("price").is_err());

    assert!(rows.next().await?.is_none());
    assert!(!conn.is_busy());
    Ok(())
}

#[derive(Debug, Deserialize, PartialEq)]
struct Order {
    id: i64,
    customer: String,
    total: String,
    placed: NaiveDate,
    shipped: Option<bool>,
}

#[tokio::test]
async fn rows_hydrate_into_records() -> Result<(), SqlsrvError> {
    let (manager, script) = ScriptedConnector::manager();
    let conn = manager.connect(&ConnectionConfig::new("localhost", "sa", "pw")).await?;
    let placed = NaiveDate::from_ymd_opt(2024, 2, 29).expect("valid date");
    let columns = vec![
        WireColumn::new("id", "int"),
        WireColumn::new("customer", "nvarchar"),
        decimal_column("total", 12, 2),
        WireColumn::new("placed", "date"),
        WireColumn::new("shipped", "bit"),
    ];
    script.push_rows(
        columns,
        vec![
            vec![
                WireValue::Int(1),
                WireValue::String("Ada".into()),
                WireValue::Numeric(Numeric::new(10050, 2)),
                WireValue::Date(placed),
                WireValue::Bit(true),
            ],
            vec![
                WireValue::Int(2),
                WireValue::String("Grace".into()),
                WireValue::Numeric(Numeric::new(5, 2)),
                WireValue::Date(placed),
                WireValue::Null,
            ],
        ],
    );

    let mut rows = execute(&conn, &Statement::select("SELECT * FROM orders")).await?.into_rows()?;
    assert_eq!(rows.column_names(), ["id", "customer", "total", "placed", "shipped"]);

    let first = rows.next().await?.expect("first row");
    let order: Order = first.deserialize()?;
    assert_eq!(
        order,
        Order {
            id: 1,
            customer: "Ada".into(),
            total: "100.50".into(),
            placed,
            shipped: Some(true),
        }
    );

    let (id, customer): (i64, String) = rows.next_as().await?.expect("second row");
    assert_eq!((id, customer.as_str()), (2, "Grace"));
    assert!(rows.next().await?.is_none());
    Ok(())
}

#[tokio::test]
async fn binary_character_set_returns_raw_bytes() -> Result<(), SqlsrvError> {
    let (manager, script) = ScriptedConnector::manager();
    let config = ConnectionConfig::builder("localhost", "sa", "pw")
        .character_set(CharacterSet::Binary)
        .finish();
    let conn = manager.connect(&config).await?;
    script.push_rows(
        vec![WireColumn::new("name", "varchar"), WireColumn::new("id", "int")],
        vec![vec![WireValue::String("café".into()), WireValue::Int(3)]],
    );

    let all = execute(&conn, &Statement::select("SELECT name, id FROM t"))
        .await?
        .into_rows()?
        .collect()
        .await?;
    assert_eq!(all.len(), 1);
    let row = &all.results[0];
    assert_eq!(row.get("name"), Some(&RowValues::Blob("café".as_bytes().to_vec())));
    assert_eq!(row.get("id"), Some(&RowValues::Int(3)));
    Ok(())
}
