mod common;

use serde_json::{json, Value};

#[test]
fn repaired_query_over_http() -> anyhow::Result<()> {
    let (_server, addr) =
        common::spawn_server("SELECT city, count(*) AS n WHERE status = 'failed' GROUP BY city")?;
    let client = common::client()?;

    let resp = client
        .post(format!("http://{addr}/api/sql"))
        .json(&json!({ "prompt": "failed transactions per city" }))
        .send()?;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json()?;

    assert_eq!(body["success"], true);
    assert_eq!(
        body["sql"],
        "SELECT city, count(*) AS n FROM transactions WHERE status = 'failed' GROUP BY city LIMIT 100;"
    );
    let rows = body["rows"].as_array().expect("rows array");
    assert!(!rows.is_empty() && rows.len() <= 6, "{body}");
    assert_eq!(body["row_count"], rows.len());
    assert!(rows[0]["city"].is_string());
    assert!(body["table"].as_str().unwrap_or_default().starts_with("+-"));
    Ok(())
}

#[test]
fn mutating_sql_is_rejected_with_detail() -> anyhow::Result<()> {
    let (_server, addr) = common::spawn_server("SELECT * FROM transactions; DROP TABLE transactions")?;
    let client = common::client()?;

    let resp = client
        .post(format!("http://{addr}/api/sql"))
        .json(&json!({ "prompt": "anything" }))
        .send()?;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json()?;
    assert_eq!(body["success"], false);
    assert_eq!(body["detail"], "Forbidden SQL operation: DROP");

    let schema: Value = client.get(format!("http://{addr}/api/schema")).send()?.json()?;
    let tables = schema["tables"].as_array().expect("tables array");
    assert!(tables.iter().any(|t| t["name"] == "transactions"));
    Ok(())
}

#[test]
fn missing_prompt_is_unprocessable() -> anyhow::Result<()> {
    let (_server, addr) = common::spawn_server("SELECT 1 FROM transactions")?;
    let resp = common::client()?
        .post(format!("http://{addr}/api/sql"))
        .json(&json!({}))
        .send()?;
    assert_eq!(resp.status(), 422);
    Ok(())
}

#[test]
fn status_reports_engine_and_cap() -> anyhow::Result<()> {
    let (_server, addr) = common::spawn_server("SELECT 1 FROM transactions")?;
    let body: Value = common::client()?.get(format!("http://{addr}/")).send()?.json()?;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["engine"], "echo");
    assert_eq!(body["db"], "sqlite");
    assert_eq!(body["max_limit"], 100);
    Ok(())
}

#[test]
fn csv_upload_creates_queryable_table() -> anyhow::Result<()> {
    let (_server, addr) = common::spawn_server("SELECT region, total FROM monthly_sales ORDER BY total")?;
    let client = common::client()?;

    let part = reqwest::blocking::multipart::Part::bytes(b"region,total\nnorth,12\nsouth,7.5\n".to_vec())
        .file_name("Monthly Sales.csv");
    let form = reqwest::blocking::multipart::Form::new().part("file", part);
    let resp = client
        .post(format!("http://{addr}/api/upload_csv"))
        .multipart(form)
        .send()?;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json()?;
    assert_eq!(body["success"], true);
    assert_eq!(body["table"], "monthly_sales");
    assert_eq!(body["rows_inserted"], 2);
    assert_eq!(body["columns"], json!(["region", "total"]));

    let body: Value = client
        .post(format!("http://{addr}/api/sql"))
        .json(&json!({ "prompt": "sales by region" }))
        .send()?
        .json()?;
    assert_eq!(body["row_count"], 2);
    assert_eq!(body["rows"][0]["region"], "south");
    assert_eq!(body["rows"][0]["total"], 7.5);
    Ok(())
}

#[test]
fn non_csv_upload_is_rejected() -> anyhow::Result<()> {
    let (_server, addr) = common::spawn_server("SELECT 1 FROM transactions")?;
    let part = reqwest::blocking::multipart::Part::bytes(b"a,b\n1,2\n".to_vec()).file_name("data.xlsx");
    let resp = common::client()?
        .post(format!("http://{addr}/api/upload_csv"))
        .multipart(reqwest::blocking::multipart::Form::new().part("file", part))
        .send()?;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json()?;
    assert_eq!(body["detail"], "Only CSV files allowed");
    Ok(())
}

#[test]
fn stacked_statements_are_rejected() -> anyhow::Result<()> {
    let (_server, addr) =
        common::spawn_server("SELECT * FROM transactions; SELECT * FROM transactions LIMIT 1")?;
    let resp = common::client()?
        .post(format!("http://{addr}/api/sql"))
        .json(&json!({ "prompt": "all rows" }))
        .send()?;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json()?;
    assert_eq!(body["detail"], "Invalid SQL generated: only one statement is allowed");
    Ok(())
}
