//! Integration tests for read-only statement classification.
//!
//! These tests verify that the classifier allows read-only statements and
//! rejects writes, DDL and statement batches with the exact caller-facing
//! reasons.

use clickhouse_gateway::tools::sql_validator::{Classification, classify, reasons};

fn assert_allowed(sql: &str, expected: &str) {
    assert_eq!(
        classify(sql),
        Classification::Allowed(expected.to_string()),
        "{:?} should be allowed",
        sql
    );
}

fn assert_rejected(sql: &str, reason: &'static str) {
    assert_eq!(
        classify(sql),
        Classification::Rejected(reason),
        "{:?} should be rejected with {:?}",
        sql,
        reason
    );
}

/// Test the basic select/drop/batch scenarios.
#[test]
fn test_select_drop_and_batch() {
    assert_allowed("SELECT 1", "SELECT 1");
    assert_rejected("DROP TABLE x", reasons::NOT_READ_ONLY);
    assert_rejected("SELECT 1; DROP TABLE x", reasons::MULTIPLE_STATEMENTS);
}

/// Test that each allowed leading keyword passes, in any case.
#[test]
fn test_allowed_keywords_case_insensitive() {
    for sql in [
        "select * from system.tables",
        "SeLeCt 1",
        "SHOW DATABASES",
        "show create table t",
        "DESCRIBE TABLE events",
        "desc events",
        "EXPLAIN PLAN SELECT 1",
        "explain syntax select 1",
        "with 1 as x select x",
    ] {
        assert!(classify(sql).is_allowed(), "{:?} should be allowed", sql);
    }
}

/// Test that write and administrative statements are rejected.
#[test]
fn test_writes_and_admin_rejected() {
    for sql in [
        "INSERT INTO t SELECT 1",
        "ALTER TABLE t UPDATE x = 1 WHERE 1",
        "ALTER TABLE t DELETE WHERE 1",
        "DELETE FROM t WHERE 1",
        "UPDATE t SET x = 1",
        "CREATE TABLE t (x UInt8) ENGINE = Memory",
        "DROP DATABASE db",
        "TRUNCATE TABLE t",
        "RENAME TABLE a TO b",
        "EXCHANGE TABLES a AND b",
        "ATTACH TABLE t",
        "DETACH TABLE t",
        "OPTIMIZE TABLE t",
        "GRANT SELECT ON *.* TO u",
        "REVOKE SELECT ON *.* FROM u",
        "KILL QUERY WHERE 1",
        "SYSTEM FLUSH LOGS",
        "SET max_threads = 1",
        "USE other_db",
        "INSERT INTO t FORMAT JSONEachRow {\"x\": 1}",
    ] {
        assert_rejected(sql, reasons::NOT_READ_ONLY);
    }
}

/// Test that a WITH clause feeding a write is rejected.
#[test]
fn test_with_feeding_write_rejected() {
    assert_rejected(
        "WITH src AS (SELECT 1 AS x) INSERT INTO t SELECT x FROM src",
        reasons::NOT_READ_ONLY,
    );
    assert_rejected(
        "WITH (SELECT max(id) FROM t) AS m ALTER TABLE t DELETE WHERE id = m",
        reasons::NOT_READ_ONLY,
    );
}

/// Test that nested CTEs ending in a SELECT are allowed.
#[test]
fn test_nested_ctes_allowed() {
    let sql = "WITH a AS (SELECT number FROM numbers(10)), b AS (SELECT number * 2 AS n FROM a) SELECT sum(n) FROM b";
    assert_allowed(sql, sql);
}

/// Test trimming and trailing separators.
#[test]
fn test_normalization() {
    assert_allowed("\n\t SELECT 1 ;\n", "SELECT 1");
    assert_allowed("SELECT 1; /* trailing */", "SELECT 1");
    assert_allowed("SELECT 'a;b'", "SELECT 'a;b'");
}

/// Test that separators hidden in comments or strings do not split statements.
#[test]
fn test_separators_in_literals_and_comments() {
    assert!(classify("SELECT 1 -- ; DROP TABLE x").is_allowed());
    assert!(classify("SELECT 1 /* ; DROP TABLE x */").is_allowed());
    assert!(classify("SELECT '; DROP TABLE x'").is_allowed());
    assert!(classify("SELECT `weird;name` FROM t").is_allowed());
}

/// Test empty and comment-only input.
#[test]
fn test_empty_input() {
    for sql in ["", "  ", "\n\n", "/* nothing */", "-- nothing", ";", " ; "] {
        assert_rejected(sql, reasons::EMPTY);
    }
}

/// Test that classification is idempotent on its own output.
#[test]
fn test_idempotence() {
    for sql in [
        "SELECT 1;",
        "  SHOW TABLES  ",
        "-- lead\nDESCRIBE t;",
        "WITH x AS (SELECT 1) SELECT * FROM x;  ",
    ] {
        let Classification::Allowed(once) = classify(sql) else {
            panic!("{:?} should be allowed", sql);
        };
        assert_eq!(classify(&once), Classification::Allowed(once.clone()));
    }
}

/// Test that system tables and keyword-like column names do not trip the
/// write-keyword check in EXPLAIN and WITH statements.
#[test]
fn test_system_tables_and_keyword_names_allowed() {
    for sql in [
        "EXPLAIN SELECT * FROM system.numbers LIMIT 1",
        "EXPLAIN SELECT use FROM t",
        "EXPLAIN SYNTAX SELECT * FROM system.one",
        "WITH t AS (SELECT name FROM system.tables) SELECT * FROM t",
        "WITH x AS (SELECT 1 AS set) SELECT set FROM x",
        "WITH 5 AS n SELECT * FROM system.numbers LIMIT n",
    ] {
        assert_allowed(sql, sql);
    }
}

/// Test that EXPLAIN of a write is still rejected.
#[test]
fn test_explain_of_write_rejected() {
    assert_rejected("EXPLAIN INSERT INTO t SELECT 1", reasons::NOT_READ_ONLY);
    assert_rejected("explain ast drop table t", reasons::NOT_READ_ONLY);
}
