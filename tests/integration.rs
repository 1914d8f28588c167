//! End-to-end pipeline tests for Segmenta

use std::io::{Cursor, Write};

use calamine::{Data, Reader, Xlsx};
use segmenta::{
    data, Method, SegmentationSession, Stage, CLUSTER_COLUMN,
};
use tempfile::NamedTempFile;

/// Primary dataset: 100 rows in three well-separated blobs.
fn primary_csv() -> Vec<u8> {
    let mut csv = String::from("id,gasto,visitas,canal\n");
    for i in 0..100 {
        let blob = (i % 3) as f64 * 25.0;
        let canal = if i % 2 == 0 { "web" } else { "tienda" };
        csv.push_str(&format!(
            "C{:03},{:.2},{:.2},{}\n",
            i,
            blob + (i as f64) * 0.01,
            blob + ((i / 3) as f64) * 0.05,
            canal
        ));
    }
    csv.into_bytes()
}

/// Demographic dataset covering every primary id plus a few strays.
fn demographic_csv() -> Vec<u8> {
    let mut csv = String::from("cliente,edad,ciudad\n");
    for i in 0..100 {
        let ciudad = ["lima", "cusco", "puno"][i % 3];
        csv.push_str(&format!("C{:03},{},{}\n", i, 20 + (i % 40), ciudad));
    }
    csv.push_str("X999,99,nowhere\n");
    csv.into_bytes()
}

fn run_full_pipeline() -> SegmentationSession {
    let mut session = SegmentationSession::new();
    session.load_table(data::read_table(&primary_csv()).unwrap());
    session
        .confirm_variables(
            "id",
            &["gasto".to_string(), "visitas".to_string()],
            &[],
        )
        .unwrap();
    session.fit_models(Method::KMeans, 2, 4, 7).unwrap();
    session.assign_clusters(Some(3)).unwrap();
    let demo = data::read_table(&demographic_csv()).unwrap();
    session
        .merge_demographics(&demo, Some("cliente"), &["edad".to_string(), "ciudad".to_string()])
        .unwrap();
    session
}

#[test]
fn test_end_to_end_pipeline() {
    let session = run_full_pipeline();
    assert_eq!(session.stage(), Stage::EnrichmentJoined);

    // the stray demographic row does not survive the inner join
    let merged = session.merged().unwrap();
    assert_eq!(merged.height(), 100);

    // every row carries a label in [0, 3)
    let labels = data::float_values(merged, CLUSTER_COLUMN).unwrap();
    assert!(labels
        .iter()
        .all(|l| matches!(l, Some(v) if (0.0..3.0).contains(v))));
}

#[test]
fn test_metrics_cover_fitted_range() {
    let mut session = SegmentationSession::new();
    session.load_table(data::read_table(&primary_csv()).unwrap());
    session
        .confirm_variables("id", &["gasto".to_string(), "visitas".to_string()], &[])
        .unwrap();
    session.fit_models(Method::Gmm, 2, 5, 7).unwrap();

    let metrics = session.metrics().unwrap();
    assert_eq!(metrics.rows.len(), 4);
    for row in &metrics.rows {
        assert!(row.aic.unwrap().is_finite());
        assert!(row.bic.unwrap().is_finite());
        // a real split of separated blobs has a defined silhouette
        assert!(row.silhouette.is_finite());
        assert!((-1.0..=1.0).contains(&row.silhouette));
    }
}

#[test]
fn test_export_round_trips_assignments() {
    let session = run_full_pipeline();
    let outcome = session.export_workbook().unwrap();
    assert!(outcome.skipped.is_empty());

    // in-memory expectation: (id, cluster) pairs from the merged table
    let merged = session.merged().unwrap();
    let ids = data::string_values(merged, "id").unwrap();
    let labels = data::float_values(merged, CLUSTER_COLUMN).unwrap();

    let mut book: Xlsx<_> = Xlsx::new(Cursor::new(outcome.bytes)).unwrap();
    let range = book.worksheet_range("Asignaciones").unwrap();
    let rows: Vec<_> = range.rows().collect();
    assert_eq!(rows.len(), 101);

    for (i, row) in rows.iter().skip(1).enumerate() {
        let id = match &row[0] {
            Data::String(s) => s.clone(),
            other => other.to_string(),
        };
        let cluster = match &row[1] {
            Data::Float(f) => *f as i64,
            Data::Int(n) => *n,
            other => panic!("unexpected cluster cell: {other:?}"),
        };
        assert_eq!(Some(id), ids[i]);
        assert_eq!(Some(cluster as f64), labels[i]);
    }

    // crosstab sheets exist for both demographic variables
    let names = book.sheet_names().to_vec();
    assert!(names.contains(&"Cross_edad".to_string()));
    assert!(names.contains(&"Cross_ciudad".to_string()));
    assert!(names.contains(&"Datos Completos".to_string()));
}

#[test]
fn test_new_upload_resets_full_session() {
    let mut session = run_full_pipeline();
    assert_eq!(session.stage(), Stage::EnrichmentJoined);

    session.load_table(data::read_table(&primary_csv()).unwrap());
    assert_eq!(session.stage(), Stage::DataLoaded);
    assert!(session.family().is_none());
    assert!(session.metrics().is_none());
    assert!(session.merged().is_none());
    assert!(session.cluster_column().is_none());
    assert!(session.selected_k().is_none());
    assert!(session.features().is_none());
}

#[test]
fn test_duplicate_identifier_blocks_pipeline() {
    let mut csv = String::from("id,gasto\n");
    for i in 0..10 {
        // only five distinct ids
        csv.push_str(&format!("C{},{}.0\n", i % 5, i));
    }
    let mut session = SegmentationSession::new();
    session.load_table(data::read_table(csv.as_bytes()).unwrap());
    let result = session.confirm_variables("id", &["gasto".to_string()], &[]);
    assert!(result.is_err());
    assert_eq!(session.stage(), Stage::DataLoaded);
    assert!(session.id_col().is_none());
}

#[test]
fn test_topic_pipeline_end_to_end() {
    let mut session = SegmentationSession::new();
    session.load_table(data::read_table(&primary_csv()).unwrap());
    session
        .confirm_variables("id", &[], &["canal".to_string()])
        .unwrap();
    session.fit_topic_segments(2, 11).unwrap();
    assert_eq!(session.stage(), Stage::ClusterAssigned);

    let demo = data::read_table(&demographic_csv()).unwrap();
    session
        .merge_demographics(&demo, Some("cliente"), &["ciudad".to_string()])
        .unwrap();
    let outcome = session.export_workbook().unwrap();
    assert!(!outcome.bytes.is_empty());

    let mut book: Xlsx<_> = Xlsx::new(Cursor::new(outcome.bytes)).unwrap();
    let range = book.worksheet_range("Asignaciones").unwrap();
    // header plus one row per matched record
    assert_eq!(range.rows().count(), 101);
}

#[test]
fn test_read_table_from_disk() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&primary_csv()).unwrap();
    let df = data::read_table_from_path(file.path().to_str().unwrap()).unwrap();
    assert_eq!(df.height(), 100);
    assert_eq!(df.width(), 4);
}
