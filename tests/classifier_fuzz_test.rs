//! Randomized tests for read-only classification.
//!
//! Each case wraps a known statement in random casing, whitespace and
//! comment prefixes, then checks the decision does not change.

use clickhouse_gateway::tools::sql_validator::{Classification, classify, reasons};
use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;

const ITERATIONS: usize = 500;

const READ_STATEMENTS: &[&str] = &[
    "select 1",
    "show tables",
    "describe table events",
    "desc events",
    "explain select 1",
    "with x as (select 1) select * from x",
];

const WRITE_STATEMENTS: &[&str] = &[
    "drop table x",
    "insert into t values (1)",
    "alter table t delete where 1",
    "create table t (x UInt8) engine = Memory",
    "truncate table t",
    "optimize table t",
    "set readonly = 0",
];

/// Generate random string of given length
fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Randomly upper- or lower-case every character.
fn random_case(sql: &str) -> String {
    let mut rng = rand::thread_rng();
    sql.chars()
        .map(|c| {
            if rng.gen_bool(0.5) {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            }
        })
        .collect()
}

/// Whitespace and comments that may precede a statement.
fn random_prefix() -> String {
    let mut rng = rand::thread_rng();
    let pieces = [
        " ".to_string(),
        "\n".to_string(),
        "\t".to_string(),
        format!("-- {}\n", random_string(8)),
        format!("/* {} */", random_string(8)),
    ];
    (0..rng.gen_range(0..4))
        .filter_map(|_| pieces.choose(&mut rng).cloned())
        .collect()
}

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    let pieces = ["", " ", ";", " ; ", ";\n", "; -- done"];
    pieces.choose(&mut rng).copied().unwrap_or("").to_string()
}

#[test]
fn test_fuzz_read_statements_stay_allowed() {
    let mut rng = rand::thread_rng();
    for _ in 0..ITERATIONS {
        let base = READ_STATEMENTS.choose(&mut rng).unwrap();
        let sql = format!("{}{}{}", random_prefix(), random_case(base), random_suffix());
        match classify(&sql) {
            Classification::Allowed(statement) => {
                assert!(!statement.ends_with(';'), "{:?} kept its separator", sql);
                assert_eq!(classify(&statement), Classification::Allowed(statement.clone()));
            }
            Classification::Rejected(reason) => panic!("{:?} rejected: {}", sql, reason),
        }
    }
}

#[test]
fn test_fuzz_write_statements_stay_rejected() {
    let mut rng = rand::thread_rng();
    for _ in 0..ITERATIONS {
        let base = WRITE_STATEMENTS.choose(&mut rng).unwrap();
        let sql = format!("{}{}{}", random_prefix(), random_case(base), random_suffix());
        assert_eq!(
            classify(&sql),
            Classification::Rejected(reasons::NOT_READ_ONLY),
            "{:?}",
            sql
        );
    }
}

#[test]
fn test_fuzz_appended_statement_is_batch() {
    let mut rng = rand::thread_rng();
    for _ in 0..ITERATIONS {
        let first = READ_STATEMENTS.choose(&mut rng).unwrap();
        let second = WRITE_STATEMENTS.choose(&mut rng).unwrap();
        let sql = format!("{}{};{}{}", random_prefix(), first, random_prefix(), second);
        assert_eq!(
            classify(&sql),
            Classification::Rejected(reasons::MULTIPLE_STATEMENTS),
            "{:?}",
            sql
        );
    }
}

#[test]
fn test_fuzz_arbitrary_input_never_panics() {
    let mut rng = rand::thread_rng();
    let alphabet: Vec<char> = "abcSELECTshow ;'\"`()/*-\n\\{}é".chars().collect();
    for _ in 0..ITERATIONS {
        let len = rng.gen_range(0..64);
        let sql: String = (0..len)
            .filter_map(|_| alphabet.choose(&mut rng).copied())
            .collect();
        if let Classification::Allowed(statement) = classify(&sql) {
            assert_eq!(classify(&statement), Classification::Allowed(statement.clone()));
        }
    }
}
