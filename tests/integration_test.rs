//! Integration tests for medallion
//!
//! Drives both stages end to end against a temp directory: a latin1 CSV
//! source, local content-store directories for the artifacts, and a
//! file-backed sqlite database reached through the same `Any` pool the
//! production DSNs use.

use medallion::config::Config;
use medallion::{run_bronze, run_check, run_silver};
use tempfile::TempDir;

const HEADER: &str = "id;data_inversa;horario;uf;municipio;latitude;longitude;feridos_leves;feridos_graves;mortos\n";

const ROWS: [&str; 3] = [
    "100001;2024-01-05;14:30:00;DF;BRASÍLIA;-15,793889;-47,882778;1;0;0",
    "100002;2024-01-06;08:15:30;SP;SÃO PAULO;-23,55;-46,633;2;1;0",
    // empty municipio, coordinates and feridos_graves
    "100003;2024-01-07;23:59:59;MG;;;;0;;1",
];

fn write_latin1_csv(path: &std::path::Path, rows: &[&str]) {
    let mut content = String::from(HEADER);
    for row in rows {
        content.push_str(row);
        content.push('\n');
    }
    let (bytes, _, _) = encoding_rs::WINDOWS_1252.encode(&content);
    std::fs::write(path, &bytes).unwrap();
}

/// Config pointing every stage at the given temp directory. Small batch
/// and chunk sizes so three rows exercise the multi-batch paths.
fn pipeline_config(dir: &TempDir) -> Config {
    let root = dir.path().display();
    let yaml = format!(
        r#"
source:
  path: "{root}/datatran.csv"
  batch_size: 2

bronze:
  url: "{root}/bronze"

silver:
  url: "{root}/silver"

database:
  dsn: "sqlite://{root}/silver.db?mode=rwc"
  chunk_size: 2
"#
    );
    let config: Config = serde_yaml::from_str(&yaml).unwrap();
    config.validate().unwrap();
    config
}

mod bronze_tests {
    use super::*;
    use arrow::array::{Array, Date32Array, Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{DataType, TimeUnit};
    use medallion::error::{NormalizeError, PipelineError};
    use medallion::source::Artifact;
    use medallion::storage::StorageProvider;
    use std::collections::HashMap;

    async fn fetch_bronze(config: &Config) -> Result<Artifact, PipelineError> {
        let storage =
            StorageProvider::for_url_with_options(&config.bronze.url, HashMap::new())
                .await
                .map_err(|source| PipelineError::Storage { source })?;
        let bytes = storage
            .get(config.bronze.key.as_str())
            .await
            .map_err(|source| PipelineError::Storage { source })?;
        Artifact::decode(bytes, &config.bronze.url)
            .map_err(|source| PipelineError::Artifact { source })
    }

    #[tokio::test]
    async fn test_bronze_publishes_typed_artifact() {
        let dir = TempDir::new().unwrap();
        write_latin1_csv(&dir.path().join("datatran.csv"), &ROWS);
        let config = pipeline_config(&dir);

        let stats = run_bronze(&config).await.unwrap();
        assert_eq!(stats.rows_read, 3);
        assert_eq!(stats.batches, 2);
        // row 100003: latitude, longitude and feridos_graves
        assert_eq!(stats.null_coercions, 3);
        assert!(stats.artifact_url.ends_with("data.parquet"));
        assert!(stats.artifact_size > 0);

        let artifact = fetch_bronze(&config).await.unwrap();
        assert_eq!(artifact.num_rows(), 3);

        let schema = artifact.schema();
        assert_eq!(
            schema.field_with_name("latitude").unwrap().data_type(),
            &DataType::Float64
        );
        assert_eq!(
            schema.field_with_name("mortos").unwrap().data_type(),
            &DataType::Int64
        );
        assert_eq!(
            schema.field_with_name("data_inversa").unwrap().data_type(),
            &DataType::Date32
        );
        assert_eq!(
            schema.field_with_name("horario").unwrap().data_type(),
            &DataType::Time32(TimeUnit::Millisecond)
        );
        assert_eq!(
            schema.field_with_name("municipio").unwrap().data_type(),
            &DataType::Utf8
        );

        let combined = artifact.combined().unwrap();
        let latitude = combined
            .column_by_name("latitude")
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert!((latitude.value(0) - -15.793889).abs() < 1e-9);
        assert!(latitude.is_null(2));

        let mortos = combined
            .column_by_name("mortos")
            .unwrap()
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(mortos.value(2), 1);

        let feridos_graves = combined
            .column_by_name("feridos_graves")
            .unwrap()
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        // empty count cells load as zero, not null
        assert!(!feridos_graves.is_null(2));
        assert_eq!(feridos_graves.value(2), 0);

        let dates = combined
            .column_by_name("data_inversa")
            .unwrap()
            .as_any()
            .downcast_ref::<Date32Array>()
            .unwrap();
        // days since the unix epoch for 2024-01-05
        assert_eq!(dates.value(0), 19727);

        let municipio = combined
            .column_by_name("municipio")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(municipio.value(0), "BRASÍLIA");
        assert_eq!(municipio.value(1), "SÃO PAULO");
        assert!(municipio.is_null(2));
    }

    #[tokio::test]
    async fn test_bronze_fails_on_unparseable_coordinate() {
        let dir = TempDir::new().unwrap();
        let rows = [
            ROWS[0],
            "100004;2024-01-08;10:00:00;RJ;RIO DE JANEIRO;not-a-number;-43,2;0;0;0",
        ];
        write_latin1_csv(&dir.path().join("datatran.csv"), &rows);
        let config = pipeline_config(&dir);

        let err = run_bronze(&config).await.unwrap_err();
        match err {
            PipelineError::Normalize {
                source: NormalizeError::InvalidCoordinate { column, .. },
            } => assert_eq!(column, "latitude"),
            other => panic!("expected coordinate error, got {other:?}"),
        }

        // nothing was published
        let err = fetch_bronze(&config).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_bronze_rerun_replaces_artifact() {
        let dir = TempDir::new().unwrap();
        write_latin1_csv(&dir.path().join("datatran.csv"), &ROWS);
        let config = pipeline_config(&dir);

        run_bronze(&config).await.unwrap();
        run_bronze(&config).await.unwrap();

        // the artifact is one whole-object put, so a re-run replaces it
        let artifact = fetch_bronze(&config).await.unwrap();
        assert_eq!(artifact.num_rows(), 3);
    }
}

mod check_tests {
    use super::*;
    use medallion::error::PipelineError;

    #[tokio::test]
    async fn test_check_passes_without_writing_artifacts() {
        let dir = TempDir::new().unwrap();
        write_latin1_csv(&dir.path().join("datatran.csv"), &ROWS);
        let config = pipeline_config(&dir);

        run_check(&config).await.unwrap();

        // the check published nothing
        assert!(!dir.path().join("bronze/data.parquet").exists());
        assert!(!dir.path().join("silver/data_silver_final.parquet").exists());
    }

    #[tokio::test]
    async fn test_check_fails_on_missing_source() {
        let dir = TempDir::new().unwrap();
        let config = pipeline_config(&dir);

        let err = run_check(&config).await.unwrap_err();
        assert!(matches!(err, PipelineError::Source { .. }));
    }

    #[tokio::test]
    async fn test_check_fails_on_unopenable_database() {
        let dir = TempDir::new().unwrap();
        write_latin1_csv(&dir.path().join("datatran.csv"), &ROWS);
        let mut config = pipeline_config(&dir);
        // sqlite will not create parent directories for the db file
        config.database.dsn = format!(
            "sqlite://{}/no-such-dir/silver.db?mode=rwc",
            dir.path().display()
        );

        let err = run_check(&config).await.unwrap_err();
        assert!(matches!(err, PipelineError::Database { .. }));
    }
}

mod silver_tests {
    use super::*;
    use medallion::source::Artifact;
    use medallion::storage::StorageProvider;
    use sqlx::any::{install_default_drivers, AnyPoolOptions};
    use sqlx::Row;
    use std::collections::HashMap;

    async fn query_pool(config: &Config) -> sqlx::AnyPool {
        install_default_drivers();
        AnyPoolOptions::new()
            .max_connections(1)
            .connect(&config.database.dsn)
            .await
            .unwrap()
    }

    async fn count(pool: &sqlx::AnyPool, sql: &str) -> i64 {
        sqlx::query(sql).fetch_one(pool).await.unwrap().get(0)
    }

    #[tokio::test]
    async fn test_silver_loads_table_and_artifact() {
        let dir = TempDir::new().unwrap();
        write_latin1_csv(&dir.path().join("datatran.csv"), &ROWS);
        let config = pipeline_config(&dir);

        run_bronze(&config).await.unwrap();
        let stats = run_silver(&config).await.unwrap();

        assert_eq!(stats.rows_loaded, 3);
        assert_eq!(stats.chunks, 2);
        assert_eq!(stats.table, "acidentes_silver");
        assert!(stats.artifact_url.ends_with("data_silver_final.parquet"));
        assert!(stats.artifact_size > 0);

        let pool = query_pool(&config).await;
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM `acidentes_silver`").await, 3);

        // missing cells land as SQL NULL, not as literal text
        assert_eq!(
            count(
                &pool,
                "SELECT COUNT(*) FROM `acidentes_silver` \
                 WHERE id = '100003' AND municipio IS NULL AND latitude IS NULL",
            )
            .await,
            1
        );
        assert_eq!(
            count(
                &pool,
                "SELECT COUNT(*) FROM `acidentes_silver` WHERE municipio = 'None'",
            )
            .await,
            0
        );

        // CAST the DATETIME columns: the Any driver decodes sqlite's
        // declared type, not the stored text, and refuses DATETIME
        let row = sqlx::query(
            "SELECT municipio, latitude, CAST(data_inversa AS TEXT), \
             CAST(horario AS TEXT), mortos \
             FROM `acidentes_silver` WHERE id = '100001'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        let municipio: String = row.get(0);
        let latitude: f64 = row.get(1);
        let data_inversa: String = row.get(2);
        let horario: String = row.get(3);
        let mortos: i64 = row.get(4);
        assert_eq!(municipio, "BRASÍLIA");
        assert!((latitude - -15.793889).abs() < 1e-9);
        assert_eq!(data_inversa, "2024-01-05 00:00:00");
        assert_eq!(horario, "1970-01-01 14:30:00");
        assert_eq!(mortos, 0);
        pool.close().await;

        // the silver artifact mirrors what the table was fed
        let storage =
            StorageProvider::for_url_with_options(&config.silver.url, HashMap::new())
                .await
                .unwrap();
        let bytes = storage.get(config.silver.key.as_str()).await.unwrap();
        let artifact = Artifact::decode(bytes, &config.silver.url).unwrap();
        assert_eq!(artifact.num_rows(), 3);
        assert_eq!(
            artifact.schema().fields().len(),
            HEADER.trim().split(';').count()
        );
    }

    #[tokio::test]
    async fn test_silver_rerun_appends_duplicate_rows() {
        let dir = TempDir::new().unwrap();
        write_latin1_csv(&dir.path().join("datatran.csv"), &ROWS);
        let config = pipeline_config(&dir);

        run_bronze(&config).await.unwrap();
        run_silver(&config).await.unwrap();
        run_silver(&config).await.unwrap();

        // loads append; only the artifact is replaced wholesale
        let pool = query_pool(&config).await;
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM `acidentes_silver`").await, 6);
        assert_eq!(
            count(
                &pool,
                "SELECT COUNT(*) FROM `acidentes_silver` WHERE id = '100001'",
            )
            .await,
            2
        );
        pool.close().await;

        let storage =
            StorageProvider::for_url_with_options(&config.silver.url, HashMap::new())
                .await
                .unwrap();
        let bytes = storage.get(config.silver.key.as_str()).await.unwrap();
        let artifact = Artifact::decode(bytes, &config.silver.url).unwrap();
        assert_eq!(artifact.num_rows(), 3);
    }
}
