mod common;

const SESSION: &str = "0123456789abcdef0123456789abcdef";

#[test]
fn dashboard_runs_and_saves_per_session() -> anyhow::Result<()> {
    let (_server, addr) = common::spawn_server("SELECT city, sum(amount) AS total FROM transactions GROUP BY city")?;
    let client = common::client()?;

    let page = client
        .get(format!("http://{addr}/dashboard?session={SESSION}"))
        .send()?
        .text()?;
    assert!(page.contains("SQL AGENT"));
    assert!(page.contains("total transactions per city"));
    assert!(page.contains(SESSION));

    let page = client
        .post(format!("http://{addr}/dashboard/run"))
        .form(&[("session", SESSION), ("query", "revenue by city")])
        .send()?
        .text()?;
    assert!(page.contains("GROUP BY city LIMIT 100;"), "{page}");
    assert!(page.contains("Rows: "));
    assert!(page.contains(r#"<button>revenue by city</button>"#));

    let page = client
        .post(format!("http://{addr}/dashboard/save"))
        .form(&[("session", SESSION), ("query", "revenue by city")])
        .send()?
        .text()?;
    assert!(page.contains("Saved as Dashboard 1"));

    // A fresh session sees none of it.
    let other = client.get(format!("http://{addr}/dashboard")).send()?.text()?;
    assert!(!other.contains("revenue by city"));
    assert!(!other.contains(SESSION));
    Ok(())
}

#[test]
fn dashboard_shows_failures_without_recording_them() -> anyhow::Result<()> {
    let (_server, addr) = common::spawn_server("DELETE FROM transactions")?;
    let page = common::client()?
        .post(format!("http://{addr}/dashboard/run"))
        .form(&[("session", SESSION), ("query", "zero everything")])
        .send()?
        .text()?;
    assert!(page.contains("Only SELECT queries are allowed"));
    assert!(!page.contains("<button>zero everything</button>"));
    Ok(())
}
