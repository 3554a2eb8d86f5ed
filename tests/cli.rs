mod common;

#[test]
fn check_prints_vetted_statement() -> anyhow::Result<()> {
    let out = common::run_cli(&["check", "SELECT name WHERE age > 30 FROM users"])?;
    assert!(out.status.success());
    assert_eq!(
        String::from_utf8(out.stdout)?.trim(),
        "SELECT name FROM users WHERE age > 30 LIMIT 100;"
    );

    let out = common::run_cli(&["check", "--max-limit", "5", "SELECT * FROM t LIMIT 50"])?;
    assert_eq!(String::from_utf8(out.stdout)?.trim(), "SELECT * FROM t LIMIT 5");
    Ok(())
}

#[test]
fn check_fails_on_unsafe_statement() -> anyhow::Result<()> {
    let out = common::run_cli(&["check", "DELETE FROM users"])?;
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("Only SELECT queries are allowed"));
    Ok(())
}

#[test]
fn query_runs_against_seeded_db() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let db = common::seeded_db(dir.path(), 50)?;
    let out = common::run_cli(&[
        "query",
        "how many transactions",
        "--db",
        db.to_str().unwrap(),
        "--generator",
        "echo",
        "--generator-arg",
        "SELECT count(*) AS n FROM transactions",
    ])?;
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8(out.stdout)?;
    assert!(stdout.starts_with("SELECT count(*) AS n FROM transactions LIMIT 100;"));
    assert!(stdout.contains("| 50 |"));
    assert!(stdout.contains("Rows: 1"));
    Ok(())
}
