//! Unit tests for rivven-recordstore translator module

use rivven_recordstore::dialect::{dialect_for, PaginationSemantics};
use rivven_recordstore::translator::{
    logical_table_name, normalize_pagination, normalize_time_range, physical_table_name,
    table_prefix, with_id_params, with_table_name, UNBOUNDED_COUNT,
};

fn semantics(
    first_zero_indexed: bool,
    first_inclusive: bool,
    second_length: bool,
    second_zero_indexed: bool,
    second_inclusive: bool,
) -> PaginationSemantics {
    PaginationSemantics {
        first_zero_indexed,
        first_inclusive,
        second_length,
        second_zero_indexed,
        second_inclusive,
    }
}

// ==================== Table Naming Tests ====================

#[test]
fn test_table_prefix() {
    assert_eq!(table_prefix(0), "ANX_0_");
    assert_eq!(table_prefix(1234), "ANX_1234_");
}

#[test]
fn test_physical_and_logical_names_agree() {
    let physical = physical_table_name(5, "PageViews").unwrap();
    assert_eq!(physical, "ANX_5_PageViews");
    assert_eq!(logical_table_name(&physical, 5), Some("PAGEVIEWS".into()));
    assert_eq!(logical_table_name(&physical, 6), None);
}

#[test]
fn test_physical_name_rejects_injection() {
    assert!(physical_table_name(1, "events; DROP TABLE ANX_META").is_err());
    assert!(physical_table_name(1, "events--").is_err());
    assert!(physical_table_name(1, "e vents").is_err());
}

#[test]
fn test_with_table_name_replaces_every_occurrence() {
    let sql = with_table_name(
        "CREATE INDEX {{TABLE_NAME}}_TS ON {{TABLE_NAME}} (record_timestamp)",
        2,
        "events",
    )
    .unwrap();
    assert_eq!(sql, "CREATE INDEX ANX_2_events_TS ON ANX_2_events (record_timestamp)");
}

#[test]
fn test_by_ids_template_translation() {
    let dialect = dialect_for("sqlite").unwrap();
    let sql = with_table_name(dialect.record_deletion_with_ids_query(), 1, "events").unwrap();
    let sql = with_id_params(&sql, 2).unwrap();

    assert_eq!(sql, "DELETE FROM ANX_1_events WHERE record_id IN (?,?)");
}

#[test]
fn test_id_params_marker_count() {
    for n in [1usize, 2, 7, 100] {
        let sql = with_id_params("({{RECORD_IDS}})", n).unwrap();
        assert_eq!(sql.matches('?').count(), n);
    }
}

// ==================== Pagination Tests ====================

#[test]
fn test_zero_indexed_inclusive_from_unchanged() {
    let s = semantics(true, true, true, true, true);
    for from in [0, 1, 10, 999] {
        assert_eq!(normalize_pagination(s, from, 5).0, from);
    }
}

#[test]
fn test_one_indexed_exclusive_from_plus_two() {
    let s = semantics(false, false, true, true, true);
    for from in [0, 1, 10, 999] {
        assert_eq!(normalize_pagination(s, from, 5).0, from + 2);
    }
}

#[test]
fn test_one_indexed_inclusive_from_plus_one() {
    let s = semantics(false, true, true, true, true);
    assert_eq!(normalize_pagination(s, 0, 5), (1, 5));
}

#[test]
fn test_end_based_second_parameter() {
    let s = semantics(true, true, false, false, true);
    assert_eq!(normalize_pagination(s, 0, 5), (0, 6));

    let s = semantics(true, true, false, false, false);
    assert_eq!(normalize_pagination(s, 0, 5), (0, 7));
}

#[test]
fn test_unbounded_count_never_adjusted() {
    let s = semantics(false, false, false, false, false);
    assert_eq!(normalize_pagination(s, 3, -1), (5, UNBOUNDED_COUNT));
    assert_eq!(normalize_pagination(s, -1, -1), (2, UNBOUNDED_COUNT));
}

#[test]
fn test_unbounded_count_fits_i32() {
    assert_eq!(UNBOUNDED_COUNT, i64::from(i32::MAX));
}

// ==================== Time Range Tests ====================

#[test]
fn test_time_sentinels() {
    assert_eq!(normalize_time_range(-1, -1), (i64::MIN, i64::MAX));
    assert_eq!(normalize_time_range(100, -1), (100, i64::MAX));
    assert_eq!(normalize_time_range(-2, 5), (-2, 5));
}
