//! Demographic enrichment join and collision-tolerant column resolution

use polars::prelude::*;

use crate::error::{Result, SegmentaError};

/// Suffix appended to right-side columns that collide on join.
pub const JOIN_SUFFIX: &str = "_right";

/// Resolve a logical column name against a joined table: the plain name
/// first, then the right-suffixed variant.
pub fn resolve_column(table: &DataFrame, name: &str) -> Option<String> {
    let suffixed = format!("{name}{JOIN_SUFFIX}");
    let columns = table.get_column_names();
    for candidate in [name, suffixed.as_str()] {
        if columns.iter().any(|c| *c == candidate) {
            return Some(candidate.to_string());
        }
    }
    None
}

/// Pick the secondary table's identifier column: an explicit choice wins,
/// then a remembered name that is still present, then the first column.
pub fn resolve_secondary_key(
    secondary: &DataFrame,
    remembered: Option<&str>,
    chosen: Option<&str>,
) -> Result<String> {
    let columns = secondary.get_column_names();
    if let Some(chosen) = chosen {
        if columns.iter().any(|c| *c == chosen) {
            return Ok(chosen.to_string());
        }
        return Err(SegmentaError::Join(format!(
            "identifier '{chosen}' is not present in the demographic table"
        )));
    }
    if let Some(remembered) = remembered {
        if columns.iter().any(|c| *c == remembered) {
            return Ok(remembered.to_string());
        }
    }
    columns
        .first()
        .map(|c| c.to_string())
        .ok_or_else(|| SegmentaError::Join("demographic table has no columns".into()))
}

/// Inner-join the primary table (restricted to the key, `keep_vars` and
/// nothing else) with the secondary table (key plus `secondary_vars`).
///
/// Both key columns are coerced to text first so differently typed
/// identifiers still match.
pub fn merge(
    primary: &DataFrame,
    secondary: &DataFrame,
    primary_key: &str,
    secondary_key: &str,
    keep_vars: &[String],
    secondary_vars: &[String],
) -> Result<DataFrame> {
    if secondary_vars.is_empty() {
        return Err(SegmentaError::Join(
            "select at least one demographic variable".into(),
        ));
    }

    let mut left_cols: Vec<String> = vec![primary_key.to_string()];
    for var in keep_vars {
        if !left_cols.contains(var) {
            left_cols.push(var.clone());
        }
    }
    let mut left = primary
        .select(left_cols)
        .map_err(|e| SegmentaError::Join(format!("primary selection failed: {e}")))?;

    let mut right_cols: Vec<String> = vec![secondary_key.to_string()];
    for var in secondary_vars {
        if !right_cols.contains(var) {
            right_cols.push(var.clone());
        }
    }
    let mut right = secondary
        .select(right_cols)
        .map_err(|e| SegmentaError::Join(format!("demographic selection failed: {e}")))?;

    let left_key = left
        .column(primary_key)?
        .cast(&DataType::String)
        .map_err(|e| SegmentaError::Join(format!("could not coerce '{primary_key}' to text: {e}")))?;
    left.with_column(left_key)?;

    let right_key = right
        .column(secondary_key)?
        .cast(&DataType::String)
        .map_err(|e| {
            SegmentaError::Join(format!("could not coerce '{secondary_key}' to text: {e}"))
        })?;
    right.with_column(right_key)?;

    left.join(
        &right,
        [primary_key],
        [secondary_key],
        JoinArgs::new(JoinType::Inner),
    )
    .map_err(|e| SegmentaError::Join(format!("merge failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::read_table;

    fn primary() -> DataFrame {
        read_table(b"id,cluster,gasto\n1,0,10.5\n2,1,22.0\n3,0,15.0\n").unwrap()
    }

    fn secondary() -> DataFrame {
        read_table(b"cliente,edad,ciudad\n1,34,lima\n2,41,cusco\n4,29,puno\n").unwrap()
    }

    #[test]
    fn test_merge_coerces_keys_to_text() {
        // primary ids parse as integers too; force a dtype mismatch
        let mut left = primary();
        let text_ids = Series::new("id", vec!["1", "2", "3"]);
        left.with_column(text_ids).unwrap();

        let merged = merge(
            &left,
            &secondary(),
            "id",
            "cliente",
            &["cluster".to_string()],
            &["edad".to_string(), "ciudad".to_string()],
        )
        .unwrap();

        // {"1","2","3"} x {1,2,4} matches exactly twice
        assert_eq!(merged.height(), 2);
        let ids = crate::data::string_values(&merged, "id").unwrap();
        assert!(ids.contains(&Some("1".to_string())));
        assert!(ids.contains(&Some("2".to_string())));
        assert!(!ids.contains(&Some("3".to_string())));
    }

    #[test]
    fn test_merge_requires_demo_vars() {
        let result = merge(&primary(), &secondary(), "id", "cliente", &[], &[]);
        assert!(matches!(result, Err(SegmentaError::Join(_))));
    }

    #[test]
    fn test_merge_suffixes_collisions() {
        let right = read_table(b"cliente,gasto\n1,99.0\n2,88.0\n").unwrap();
        let merged = merge(
            &primary(),
            &right,
            "id",
            "cliente",
            &["cluster".to_string(), "gasto".to_string()],
            &["gasto".to_string()],
        )
        .unwrap();

        assert!(resolve_column(&merged, "gasto").is_some());
        let names = merged.get_column_names();
        assert!(names.iter().any(|c| *c == format!("gasto{JOIN_SUFFIX}")));
    }

    #[test]
    fn test_resolve_column_prefers_plain_name() {
        let df = read_table(b"a,a_right\n1,2\n").unwrap();
        assert_eq!(resolve_column(&df, "a"), Some("a".to_string()));
        assert_eq!(resolve_column(&df, "b"), None);
    }

    #[test]
    fn test_resolve_secondary_key_order() {
        let df = secondary();
        assert_eq!(
            resolve_secondary_key(&df, None, Some("cliente")).unwrap(),
            "cliente"
        );
        assert_eq!(
            resolve_secondary_key(&df, Some("cliente"), None).unwrap(),
            "cliente"
        );
        // a remembered name that vanished falls back to the first column
        assert_eq!(
            resolve_secondary_key(&df, Some("desaparecida"), None).unwrap(),
            "cliente"
        );
        assert!(resolve_secondary_key(&df, None, Some("desaparecida")).is_err());
    }
}
